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

use crate::ast::{AssignTarget, BinaryOp, Expr, FunctionDecl, Item, Literal, Program, Stmt, UnaryOp};
use crate::runtime::interceptor::{self, InterceptorSet};
use crate::runtime::{hooks, HookEvent, HookRegistry, RuntimeError, Value};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const MAX_CALL_DEPTH: usize = 250;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter<'a> {
    functions: HashMap<String, Rc<FunctionDecl>>,
    scopes: Vec<HashMap<String, Value>>,
    hooks: &'a HookRegistry,
    interceptors: &'a mut InterceptorSet,
    steps_remaining: u64,
    deadline: Instant,
    call_depth: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        hooks: &'a HookRegistry,
        interceptors: &'a mut InterceptorSet,
        steps: u64,
        deadline: Instant,
    ) -> Self {
        Self {
            functions: HashMap::new(),
            scopes: vec![HashMap::new()],
            hooks,
            interceptors,
            steps_remaining: steps,
            deadline,
            call_depth: 0,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn steps_remaining(&self) -> u64 {
        self.steps_remaining
    }

    pub fn globals_snapshot(&self) -> HashMap<String, Value> {
        self.scopes[0].clone()
    }

    pub async fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for item in &program.items {
            if let Item::Function(decl) = item {
                self.functions
                    .insert(decl.name.clone(), Rc::new(decl.clone()));
            }
        }
        for item in &program.items {
            if let Item::Stmt(stmt) = item {
                match self.exec_stmt(stmt).await? {
                    Flow::Return(value) => {
                        // A top-level return ends the envelope early; keep the
                        // value reachable for result capture.
                        let already = self
                            .lookup("__result")
                            .is_some_and(|v| v.is_usable_result());
                        if !already {
                            self.scopes[0].insert("__result".to_string(), value);
                        }
                        return Ok(());
                    }
                    Flow::Normal | Flow::Break | Flow::Continue => {}
                }
            }
        }
        Ok(())
    }

    pub async fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let decl = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownIdentifier(name.to_string()))?;
        self.call_declared(decl, args).await
    }

    pub fn load_functions(&mut self, program: &Program) {
        for item in &program.items {
            if let Item::Function(decl) = item {
                self.functions
                    .insert(decl.name.clone(), Rc::new(decl.clone()));
            }
        }
    }

    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.scopes[0].insert(name.into(), value);
    }

    async fn checkpoint(&mut self) -> Result<(), RuntimeError> {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(RuntimeError::Cancelled);
            }
        }
        if self.steps_remaining == 0 {
            return Err(RuntimeError::OutOfSteps);
        }
        self.steps_remaining -= 1;
        if Instant::now() >= self.deadline {
            return Err(RuntimeError::OutOfTime);
        }
        // Suspension point: let the host's render loop advance.
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn dispatch_hook(&mut self, name: &str, args: Vec<Value>) {
        self.hooks.dispatch(&HookEvent {
            hook: name.to_string(),
            args,
        });
        tokio::task::yield_now().await;
    }

    fn exec_stmt<'b>(&'b mut self, stmt: &'b Stmt) -> LocalBoxFuture<'b, Result<Flow, RuntimeError>> {
        async move {
            match stmt {
                Stmt::Let { name, init } => {
                    let value = match init {
                        Some(expr) => self.eval(expr).await?,
                        None => Value::Undefined,
                    };
                    self.define_local(name.clone(), value);
                    Ok(Flow::Normal)
                }
                Stmt::Assign { target, value } => {
                    let value = self.eval(value).await?;
                    self.assign(target, value).await?;
                    Ok(Flow::Normal)
                }
                Stmt::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    if self.eval(condition).await?.is_truthy() {
                        self.exec_block(then_branch).await
                    } else if let Some(else_branch) = else_branch {
                        self.exec_block(else_branch).await
                    } else {
                        Ok(Flow::Normal)
                    }
                }
                Stmt::While { condition, body } => {
                    loop {
                        self.checkpoint().await?;
                        if !self.eval(condition).await?.is_truthy() {
                            break;
                        }
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal => {}
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::For {
                    init,
                    condition,
                    step,
                    body,
                } => {
                    if let Some(init) = init {
                        self.exec_stmt(init).await?;
                    }
                    loop {
                        self.checkpoint().await?;
                        if let Some(condition) = condition {
                            if !self.eval(condition).await?.is_truthy() {
                                break;
                            }
                        }
                        match self.exec_block(body).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal => {}
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                        if let Some(step) = step {
                            self.exec_stmt(step).await?;
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(expr).await?,
                        None => Value::Undefined,
                    };
                    Ok(Flow::Return(value))
                }
                Stmt::Break => Ok(Flow::Break),
                Stmt::Continue => Ok(Flow::Continue),
                Stmt::Expr(expr) => {
                    self.eval(expr).await?;
                    Ok(Flow::Normal)
                }
                Stmt::Block(body) => self.exec_block(body).await,
            }
        }
        .boxed_local()
    }

    fn exec_block<'b>(
        &'b mut self,
        stmts: &'b [Stmt],
    ) -> LocalBoxFuture<'b, Result<Flow, RuntimeError>> {
        async move {
            for stmt in stmts {
                match self.exec_stmt(stmt).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed_local()
    }

    fn eval<'b>(&'b mut self, expr: &'b Expr) -> LocalBoxFuture<'b, Result<Value, RuntimeError>> {
        async move {
            match expr {
                Expr::Literal(lit) => self.eval_literal(lit).await,
                Expr::Var(name) => self
                    .lookup(name)
                    .ok_or_else(|| RuntimeError::UnknownIdentifier(name.clone())),
                Expr::Member { object, name } => {
                    let object = self.eval(object).await?;
                    member_read(&object, name)
                }
                Expr::Index { object, index } => {
                    let object = self.eval(object).await?;
                    let index = self.eval(index).await?;
                    index_read(&object, &index)
                }
                Expr::Unary { op, expr } => {
                    let value = self.eval(expr).await?;
                    match op {
                        UnaryOp::Neg => {
                            let n = to_arith_number(&value).ok_or_else(|| {
                                RuntimeError::InvalidOperation("negation of non-number".into())
                            })?;
                            Ok(Value::Number(-n))
                        }
                        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    }
                }
                Expr::Binary { op, left, right } => self.eval_binary(*op, left, right).await,
                Expr::Call { callee, args } => self.eval_call(callee, args).await,
                Expr::Conditional {
                    condition,
                    then_expr,
                    else_expr,
                } => {
                    if self.eval(condition).await?.is_truthy() {
                        self.eval(then_expr).await
                    } else {
                        self.eval(else_expr).await
                    }
                }
                Expr::CoerceNumber(inner) => {
                    let value = self.eval(inner).await?;
                    Ok(Value::Number(to_arith_number(&value).unwrap_or(0.0)))
                }
            }
        }
        .boxed_local()
    }

    async fn eval_literal(&mut self, lit: &Literal) -> Result<Value, RuntimeError> {
        match lit {
            Literal::Null => Ok(Value::Null),
            Literal::Undefined => Ok(Value::Undefined),
            Literal::Bool(b) => Ok(Value::Bool(*b)),
            Literal::Number(n) => Ok(Value::Number(*n)),
            Literal::Str(s) => Ok(Value::Str(s.clone())),
            Literal::Array(elems) => {
                let mut items = Vec::with_capacity(elems.len());
                for elem in elems {
                    items.push(self.eval(elem).await?);
                }
                Ok(Value::array(items))
            }
        }
    }

    async fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value, RuntimeError> {
        // Logical operators short-circuit and yield the operand itself.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = self.eval(left).await?;
            return match op {
                BinaryOp::And if !lhs.is_truthy() => Ok(lhs),
                BinaryOp::Or if lhs.is_truthy() => Ok(lhs),
                _ => self.eval(right).await,
            };
        }
        let lhs = self.eval(left).await?;
        let rhs = self.eval(right).await?;
        match op {
            BinaryOp::Add => match (&lhs, &rhs) {
                (Value::Str(a), b) => Ok(Value::Str(format!("{a}{b}"))),
                (a, Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
                _ => numeric_op(&lhs, &rhs, "addition", |a, b| a + b),
            },
            BinaryOp::Sub => numeric_op(&lhs, &rhs, "subtraction", |a, b| a - b),
            BinaryOp::Mul => numeric_op(&lhs, &rhs, "multiplication", |a, b| a * b),
            BinaryOp::Div => {
                let b = to_arith_number(&rhs);
                if b == Some(0.0) {
                    return Err(RuntimeError::DivisionByZero);
                }
                numeric_op(&lhs, &rhs, "division", |a, b| a / b)
            }
            BinaryOp::Mod => {
                let b = to_arith_number(&rhs);
                if b == Some(0.0) {
                    return Err(RuntimeError::DivisionByZero);
                }
                numeric_op(&lhs, &rhs, "modulo", |a, b| a % b)
            }
            BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
            BinaryOp::Lt => compare_op(&lhs, &rhs, |ord| ord.is_lt()),
            BinaryOp::Le => compare_op(&lhs, &rhs, |ord| ord.is_le()),
            BinaryOp::Gt => compare_op(&lhs, &rhs, |ord| ord.is_gt()),
            BinaryOp::Ge => compare_op(&lhs, &rhs, |ord| ord.is_ge()),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    async fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, RuntimeError> {
        if let Expr::Member { object, name } = callee {
            return self.eval_method_call(object, name, args).await;
        }
        let Expr::Var(name) = callee else {
            return Err(RuntimeError::NotCallable("<expression>".to_string()));
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg).await?);
        }

        match name.as_str() {
            "__defined" => return Ok(self.intrinsic_defined(&values)),
            "__capture" => return Ok(self.intrinsic_capture(&values)),
            "__capture_results" => {
                self.intrinsic_capture_results();
                return Ok(Value::Undefined);
            }
            _ => {}
        }

        if interceptor::is_primitive(name) {
            return self.call_primitive(name, values).await;
        }

        // Instrumentation-inserted hook names take precedence so a learner
        // function can never shadow a visualization callback.
        if hooks::is_hook_name(name) {
            self.dispatch_hook(name, values).await;
            return Ok(Value::Undefined);
        }

        if let Some(decl) = self.functions.get(name).cloned() {
            return self.call_declared(decl, values).await;
        }

        // A bound variable that is not a function cannot be invoked; an
        // unbound name is a plain unknown identifier.
        if self.lookup(name).is_some() {
            Err(RuntimeError::NotCallable(name.clone()))
        } else {
            Err(RuntimeError::UnknownIdentifier(name.clone()))
        }
    }

    fn call_declared<'b>(
        &'b mut self,
        decl: Rc<FunctionDecl>,
        args: Vec<Value>,
    ) -> LocalBoxFuture<'b, Result<Value, RuntimeError>> {
        async move {
            self.checkpoint().await?;
            if self.call_depth >= MAX_CALL_DEPTH {
                return Err(RuntimeError::CallDepthExceeded);
            }
            let mut frame = HashMap::new();
            for (i, param) in decl.params.iter().enumerate() {
                frame.insert(
                    param.clone(),
                    args.get(i).cloned().unwrap_or(Value::Undefined),
                );
            }
            self.scopes.push(frame);
            self.call_depth += 1;
            let result = self.exec_block(&decl.body).await;
            self.call_depth -= 1;
            self.scopes.pop();
            match result? {
                Flow::Return(value) => Ok(value),
                Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Undefined),
            }
        }
        .boxed_local()
    }

    async fn call_primitive(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let coords = primitive_coords(&args);
        match name {
            interceptor::PLACE => {
                if let Some((row, col)) = coords {
                    self.interceptors.record_place(row, col);
                }
                self.dispatch_hook(hooks::PIECE_PLACE, args.clone()).await;
            }
            interceptor::REMOVE => {
                if let Some((row, col)) = coords {
                    self.interceptors.record_remove(row, col);
                }
                self.dispatch_hook(hooks::PIECE_REMOVE, args.clone()).await;
            }
            _ => {}
        }

        if let Some(decl) = self.functions.get(name).cloned() {
            return self.call_declared(decl, args).await;
        }

        match name {
            interceptor::PLACE | interceptor::REMOVE => {
                let mark = if name == interceptor::PLACE { 1.0 } else { 0.0 };
                if let (Some((row, col)), Some(board)) = (coords, self.primitive_board(&args)) {
                    set_board_cell(&board, row, col, mark);
                }
                Ok(Value::Undefined)
            }
            interceptor::SAFE => {
                let board = self
                    .primitive_board(&args)
                    .ok_or_else(|| RuntimeError::UnknownIdentifier("board".to_string()))?;
                let (row, col) = primitive_coords(&args).ok_or_else(|| {
                    RuntimeError::InvalidOperation("safe() requires row and column".into())
                })?;
                Ok(Value::Bool(is_safe_placement(&board, row, col)))
            }
            _ => unreachable!("not a primitive"),
        }
    }

    fn primitive_board(&self, args: &[Value]) -> Option<Value> {
        if let Some(first @ Value::Array(_)) = args.first() {
            return Some(first.clone());
        }
        self.lookup("board")
    }

    fn intrinsic_defined(&self, args: &[Value]) -> Value {
        let Some(Value::Str(name)) = args.first() else {
            return Value::Bool(false);
        };
        Value::Bool(self.lookup(name).is_some_and(|v| !v.is_undefined()))
    }

    fn intrinsic_capture(&self, args: &[Value]) -> Value {
        let Some(Value::Str(name)) = args.first() else {
            return Value::Undefined;
        };
        self.lookup(name).unwrap_or(Value::Undefined)
    }

    fn intrinsic_capture_results(&mut self) {
        let already = self
            .lookup("__result")
            .is_some_and(|v| v.is_usable_result());
        if already {
            return;
        }
        if let Some(value) = self.lookup("result") {
            if value.is_usable_result() {
                self.scopes[0].insert("__result".to_string(), value);
            }
        }
    }

    async fn eval_method_call(
        &mut self,
        object: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Result<Value, RuntimeError> {
        if let Expr::Var(ns) = object {
            if ns == "Math" {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg).await?);
                }
                return math_builtin(name, &values);
            }
        }
        let target = self.eval(object).await?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg).await?);
        }
        match (&target, name) {
            (Value::Array(items), "push") => {
                let mut items = items.borrow_mut();
                for v in values {
                    items.push(v);
                }
                Ok(Value::Number(items.len() as f64))
            }
            (Value::Array(items), "pop") => {
                Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined))
            }
            (Value::Array(items), "includes") => {
                let needle = values.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Bool(
                    items.borrow().iter().any(|v| v.loose_eq(&needle)),
                ))
            }
            (Value::Array(items), "indexOf") => {
                let needle = values.first().cloned().unwrap_or(Value::Undefined);
                let index = items
                    .borrow()
                    .iter()
                    .position(|v| v.loose_eq(&needle))
                    .map_or(-1.0, |i| i as f64);
                Ok(Value::Number(index))
            }
            _ => Err(RuntimeError::InvalidOperation(format!(
                "no method '{name}' on {target}"
            ))),
        }
    }

    async fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), RuntimeError> {
        if target.indices.is_empty() {
            self.set_var(&target.name, value);
            return Ok(());
        }
        let mut current = self
            .lookup(&target.name)
            .ok_or_else(|| RuntimeError::UnknownIdentifier(target.name.clone()))?;
        for index in &target.indices[..target.indices.len() - 1] {
            let index = self.eval(index).await?;
            current = index_read(&current, &index)?;
        }
        let last = self.eval(&target.indices[target.indices.len() - 1]).await?;
        index_write(&current, &last, value)
    }

    fn define_local(&mut self, name: String, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, value);
    }

    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.scopes.last_mut() {
            if frame.contains_key(name) {
                frame.insert(name.to_string(), value);
                return;
            }
        }
        if self.scopes[0].contains_key(name) {
            self.scopes[0].insert(name.to_string(), value);
            return;
        }
        // Assignment to an undeclared name lands in the top-level scope,
        // matching the source language.
        self.scopes[0].insert(name.to_string(), value);
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(frame) = self.scopes.last() {
            if let Some(value) = frame.get(name) {
                return Some(value.clone());
            }
        }
        self.scopes[0].get(name).cloned()
    }
}

fn to_arith_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn numeric_op(
    lhs: &Value,
    rhs: &Value,
    context: &str,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (to_arith_number(lhs), to_arith_number(rhs)) {
        (Some(a), Some(b)) => Ok(Value::Number(op(a, b))),
        _ => Err(RuntimeError::InvalidOperation(format!(
            "{context} on non-numeric operands ({lhs} and {rhs})"
        ))),
    }
}

fn compare_op(
    lhs: &Value,
    rhs: &Value,
    check: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, RuntimeError> {
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(Value::Bool(check(a.cmp(b))));
    }
    match (to_arith_number(lhs), to_arith_number(rhs)) {
        (Some(a), Some(b)) => Ok(Value::Bool(
            a.partial_cmp(&b).map(&check).unwrap_or(false),
        )),
        _ => Err(RuntimeError::InvalidOperation(format!(
            "comparison of {lhs} and {rhs}"
        ))),
    }
}

fn member_read(object: &Value, name: &str) -> Result<Value, RuntimeError> {
    match (object, name) {
        (Value::Array(items), "length") => Ok(Value::Number(items.borrow().len() as f64)),
        (Value::Str(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}

fn index_read(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let Value::Array(items) = object else {
        return Err(RuntimeError::InvalidOperation(format!(
            "cannot index into {object}"
        )));
    };
    let Some(i) = index.as_number() else {
        return Ok(Value::Undefined);
    };
    if i < 0.0 {
        return Ok(Value::Undefined);
    }
    // Out-of-range reads yield undefined rather than aborting the run.
    Ok(items
        .borrow()
        .get(i as usize)
        .cloned()
        .unwrap_or(Value::Undefined))
}

fn index_write(object: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    let Value::Array(items) = object else {
        return Err(RuntimeError::InvalidOperation(format!(
            "cannot index into {object}"
        )));
    };
    let Some(i) = index.as_number() else {
        return Err(RuntimeError::InvalidOperation(
            "array index must be numeric".into(),
        ));
    };
    if i < 0.0 {
        return Err(RuntimeError::InvalidOperation(
            "array index must be non-negative".into(),
        ));
    }
    let i = i as usize;
    let mut items = items.borrow_mut();
    if i >= items.len() {
        items.resize(i + 1, Value::Undefined);
    }
    items[i] = value;
    Ok(())
}

fn math_builtin(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    let nums: Vec<f64> = args.iter().filter_map(to_arith_number).collect();
    let result = match (name, nums.as_slice()) {
        ("max", _) if !nums.is_empty() => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ("min", _) if !nums.is_empty() => nums.iter().copied().fold(f64::INFINITY, f64::min),
        ("floor", [n, ..]) => n.floor(),
        ("ceil", [n, ..]) => n.ceil(),
        ("abs", [n, ..]) => n.abs(),
        ("sqrt", [n, ..]) => n.sqrt(),
        ("pow", [a, b, ..]) => a.powf(*b),
        _ => {
            return Err(RuntimeError::InvalidOperation(format!(
                "unsupported Math.{name} call"
            )))
        }
    };
    Ok(Value::Number(result))
}

fn primitive_coords(args: &[Value]) -> Option<(i64, i64)> {
    // Either (row, col) with the ambient board, or (board, row, col).
    let offset = usize::from(matches!(args.first(), Some(Value::Array(_))));
    let row = args.get(offset)?.as_number()?;
    let col = args.get(offset + 1)?.as_number()?;
    Some((row as i64, col as i64))
}

fn set_board_cell(board: &Value, row: i64, col: i64, mark: f64) {
    if row < 0 || col < 0 {
        return;
    }
    if let Value::Array(rows) = board {
        if let Some(Value::Array(cells)) = rows.borrow().get(row as usize) {
            let mut cells = cells.borrow_mut();
            let col = col as usize;
            if col < cells.len() {
                cells[col] = Value::Number(mark);
            }
        }
    }
}

fn board_cell(board: &Value, row: i64, col: i64) -> Option<f64> {
    if row < 0 || col < 0 {
        return None;
    }
    if let Value::Array(rows) = board {
        if let Some(Value::Array(cells)) = rows.borrow().get(row as usize) {
            return cells.borrow().get(col as usize).and_then(Value::as_number);
        }
    }
    None
}

fn is_safe_placement(board: &Value, row: i64, col: i64) -> bool {
    for r in 0..row {
        let d = row - r;
        for c in [col, col - d, col + d] {
            if board_cell(board, r, c).is_some_and(|v| v != 0.0) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use std::time::Duration;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_arithmetic_and_loops() {
        let program = parse_program(
            r"
            var total = 0;
            for (var i = 1; i <= 4; i++) {
                total += i;
            }
            ",
        )
        .unwrap();
        let hooks = HookRegistry::new();
        let mut interceptors = InterceptorSet::new();
        let mut interp = Interpreter::new(&hooks, &mut interceptors, 10_000, far_deadline());
        interp.run(&program).await.unwrap();
        assert_eq!(
            interp.globals_snapshot().get("total"),
            Some(&Value::Number(10.0))
        );
    }

    #[tokio::test]
    async fn test_step_budget_stops_infinite_loop() {
        let program = parse_program("while (true) { }").unwrap();
        let hooks = HookRegistry::new();
        let mut interceptors = InterceptorSet::new();
        let mut interp = Interpreter::new(&hooks, &mut interceptors, 500, far_deadline());
        let err = interp.run(&program).await.unwrap_err();
        assert!(err.is_budget_exceeded());
    }

    #[tokio::test]
    async fn test_recursion_depth_is_budget_class() {
        let program = parse_program(
            r"
            function loop(n) { return loop(n + 1); }
            loop(0);
            ",
        )
        .unwrap();
        let hooks = HookRegistry::new();
        let mut interceptors = InterceptorSet::new();
        let mut interp = Interpreter::new(&hooks, &mut interceptors, 1_000_000, far_deadline());
        let err = interp.run(&program).await.unwrap_err();
        assert!(err.is_budget_exceeded());
    }

    #[tokio::test]
    async fn test_arrays_share_storage_across_calls() {
        let program = parse_program(
            r"
            function record(acc, v) { acc.push(v); }
            var acc = [];
            record(acc, 7);
            record(acc, 9);
            ",
        )
        .unwrap();
        let hooks = HookRegistry::new();
        let mut interceptors = InterceptorSet::new();
        let mut interp = Interpreter::new(&hooks, &mut interceptors, 10_000, far_deadline());
        interp.run(&program).await.unwrap();
        let acc = interp.globals_snapshot().get("acc").cloned().unwrap();
        assert_eq!(
            acc,
            Value::array(vec![Value::Number(7.0), Value::Number(9.0)])
        );
    }

    #[tokio::test]
    async fn test_builtin_primitives_without_learner_definitions() {
        let program = parse_program(
            r"
            if (safe(0, 2)) {
                place(0, 2);
            }
            ",
        )
        .unwrap();
        let hooks = HookRegistry::new();
        let mut interceptors = InterceptorSet::new();
        let mut interp = Interpreter::new(&hooks, &mut interceptors, 10_000, far_deadline());
        interp.define_global(
            "board",
            Value::array(vec![
                Value::number_array(&[0.0, 0.0, 0.0]),
                Value::number_array(&[0.0, 0.0, 0.0]),
            ]),
        );
        interp.run(&program).await.unwrap();
        assert_eq!(interceptors.records(), &[(0, 2)]);
    }
}
