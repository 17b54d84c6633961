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

use crate::envelope::ExecutionEnvelope;
use crate::level::BudgetConfig;
use crate::logging;
use crate::runtime::interceptor::InterceptorSet;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::{CapturedOutcome, HookRegistry, RuntimeError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionBudget {
    pub steps: u64,
    pub wall_clock: Duration,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            steps: 200_000,
            wall_clock: Duration::from_secs(5),
        }
    }
}

impl From<BudgetConfig> for ExecutionBudget {
    fn from(config: BudgetConfig) -> Self {
        Self {
            steps: config.steps,
            wall_clock: Duration::from_millis(config.wall_clock_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Faulted,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(CapturedOutcome),
    TimedOut(CapturedOutcome),
    Faulted {
        fault: String,
        captured: CapturedOutcome,
    },
    Cancelled,
}

impl RunOutcome {
    pub fn captured(&self) -> Option<&CapturedOutcome> {
        match self {
            RunOutcome::Completed(c) | RunOutcome::TimedOut(c) => Some(c),
            RunOutcome::Faulted { captured, .. } => Some(captured),
            RunOutcome::Cancelled => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, RunOutcome::TimedOut(_))
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

pub struct SandboxedExecutor {
    state: RunState,
    budget: ExecutionBudget,
    cancel: Arc<AtomicBool>,
}

impl SandboxedExecutor {
    pub fn new(budget: ExecutionBudget) -> Self {
        Self {
            state: RunState::Idle,
            budget,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn budget(&self) -> ExecutionBudget {
        self.budget
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub async fn execute(
        &mut self,
        envelope: &ExecutionEnvelope,
        hooks: &HookRegistry,
        interceptors: &mut InterceptorSet,
    ) -> RunOutcome {
        // Reset discipline: no decision state or stale cancellation may leak
        // into this attempt.
        self.cancel.store(false, Ordering::Relaxed);
        interceptors.clear();
        self.state = RunState::Running;

        let deadline = Instant::now() + self.budget.wall_clock;
        let mut interpreter = Interpreter::new(hooks, interceptors, self.budget.steps, deadline)
            .with_cancel(Arc::clone(&self.cancel));

        let result = interpreter.run(envelope.program()).await;
        let globals = interpreter.globals_snapshot();
        let steps_remaining = interpreter.steps_remaining();
        drop(interpreter);
        let direct = globals
            .get("__result")
            .filter(|v| v.is_usable_result())
            .cloned();
        let captured = CapturedOutcome { direct, globals };

        match result {
            Ok(()) => {
                self.state = RunState::Completed;
                logging::log_execution_step(&envelope.level_id, "completed", steps_remaining);
                RunOutcome::Completed(captured)
            }
            Err(RuntimeError::Cancelled) => {
                self.state = RunState::Idle;
                interceptors.clear();
                RunOutcome::Cancelled
            }
            Err(err) if err.is_budget_exceeded() => {
                self.state = RunState::TimedOut;
                logging::log_runtime_event(
                    "budget_exceeded",
                    serde_json::json!({ "level": envelope.level_id, "error": err.to_string() }),
                );
                RunOutcome::TimedOut(captured)
            }
            Err(err) => {
                self.state = RunState::Faulted;
                logging::log_error("envelope execution", &err);
                RunOutcome::Faulted {
                    fault: err.to_string(),
                    captured,
                }
            }
        }
    }
}
