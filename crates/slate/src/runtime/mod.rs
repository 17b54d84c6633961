// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

pub mod executor;
pub mod interceptor;
pub mod interpreter;

pub use executor::{CancelHandle, ExecutionBudget, RunOutcome, RunState, SandboxedExecutor};
pub use interceptor::InterceptorSet;
pub use interpreter::Interpreter;

use crate::logging;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                let rendered: Vec<String> =
                    items.borrow().iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(","))
            }
        }
    }
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn number_array(items: &[f64]) -> Self {
        Value::array(items.iter().map(|n| Value::Number(*n)).collect())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    // Arrays must be non-empty to count as a result; scalars always do.
    pub fn is_usable_result(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Array(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            _ => self == other,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

pub mod hooks {
    pub const CELL_UPDATE: &str = "cell_update";
    pub const PATH_UPDATE: &str = "path_update";
    pub const NODE_VISIT: &str = "node_visit";
    pub const PIECE_PLACE: &str = "piece_place";
    pub const PIECE_REMOVE: &str = "piece_remove";
    pub const CUT_PUSH: &str = "cut_push";
    pub const CUT_POP: &str = "cut_pop";
    pub const SCHEDULE_ASSIGN: &str = "schedule_assign";
    pub const CALL_RETURN: &str = "call_return";

    pub const ALL: &[&str] = &[
        CELL_UPDATE,
        PATH_UPDATE,
        NODE_VISIT,
        PIECE_PLACE,
        PIECE_REMOVE,
        CUT_PUSH,
        CUT_POP,
        SCHEDULE_ASSIGN,
        CALL_RETURN,
    ];

    pub fn is_hook_name(name: &str) -> bool {
        ALL.contains(&name)
    }
}

#[derive(Error, Debug)]
#[error("hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct HookEvent {
    pub hook: String,
    pub args: Vec<Value>,
}

pub type HookFn = Arc<dyn Fn(&HookEvent) -> Result<(), HookError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, HookFn>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: HookFn) -> &mut Self {
        self.hooks.insert(name.into(), hook);
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&HookEvent) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(hook))
    }

    pub fn dispatch(&self, event: &HookEvent) {
        if let Some(hook) = self.hooks.get(&event.hook) {
            if let Err(e) = hook(event) {
                logging::log_error("hook dispatch", &e);
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Step budget exhausted")]
    OutOfSteps,
    #[error("Wall clock budget exhausted")]
    OutOfTime,
    #[error("Call depth limit exceeded")]
    CallDepthExceeded,
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Run cancelled")]
    Cancelled,
}

impl RuntimeError {
    // The depth ceiling is part of the same termination guarantee as the
    // step counter.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self,
            RuntimeError::OutOfSteps | RuntimeError::OutOfTime | RuntimeError::CallDepthExceeded
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapturedOutcome {
    pub direct: Option<Value>,
    pub globals: HashMap<String, Value>,
}

impl CapturedOutcome {
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name).filter(|v| !v.is_undefined())
    }
}
