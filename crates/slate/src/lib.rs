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

pub mod ast;
pub mod detector;
pub mod envelope;
pub mod level;
pub mod logging;
pub mod parser;
pub mod resolver;
pub mod rewriter;
pub mod runtime;
pub mod verifier;

pub use detector::{AlgorithmDetector, AlgorithmProfile, DetectedProgram, EntryPoint};
pub use envelope::{EnvelopeAssembler, ExecutionEnvelope};
pub use level::{BudgetConfig, Comparison, LevelConfig, LevelData, ProfileFlags, TestCase};
pub use parser::{parse_program, ParseError};
pub use resolver::{Resolution, ResolutionOrigin, ResultResolver};
pub use rewriter::{InstrumentationRewriter, IMPL_PREFIX};
pub use runtime::{
    CancelHandle, ExecutionBudget, HookEvent, HookRegistry, InterceptorSet, RunOutcome, RunState,
    SandboxedExecutor, Value,
};
pub use verifier::{TestCaseVerifier, TestVerificationResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct SourceProgram {
    pub text: String,
    pub level_id: String,
    pub attempt_id: String,
}

impl SourceProgram {
    pub fn new(text: impl Into<String>, level_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level_id: level_id.into(),
            attempt_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Completed,
    TimedOut,
    Faulted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnerMessage {
    ProbableInfiniteLoop,
    CouldNotDetermineResult,
    PrimaryTestFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    pub attempt_id: String,
    pub level_id: String,
    pub profile: AlgorithmProfile,
    pub outcome: AttemptOutcome,
    pub resolution_origin: ResolutionOrigin,
    pub resolved_value: Option<serde_json::Value>,
    pub verification: TestVerificationResult,
    pub learner_messages: Vec<LearnerMessage>,
    pub finished_at: DateTime<Utc>,
}

pub async fn run_attempt(
    source: &SourceProgram,
    level: &LevelConfig,
    hooks: &HookRegistry,
) -> anyhow::Result<AttemptReport> {
    level.validate()?;

    let program = match parser::parse_program(&source.text) {
        Ok(program) => program,
        Err(err) => {
            logging::log_error("source parse", &err);
            return Ok(unparseable_report(source, level));
        }
    };

    let detected = AlgorithmDetector::detect(&program, &level.flags);
    let instrumented = InstrumentationRewriter::instrument(program.clone(), &detected);
    let envelope = EnvelopeAssembler::assemble(level, &detected, instrumented);

    let budget = ExecutionBudget::from(level.budget);
    let mut executor = SandboxedExecutor::new(budget);
    let mut interceptors = InterceptorSet::new();
    let run = executor.execute(&envelope, hooks, &mut interceptors).await;

    let outcome = match &run {
        RunOutcome::Completed(_) => AttemptOutcome::Completed,
        RunOutcome::TimedOut(_) => AttemptOutcome::TimedOut,
        RunOutcome::Faulted { .. } => AttemptOutcome::Faulted,
        RunOutcome::Cancelled => AttemptOutcome::Cancelled,
    };

    let resolution = match run.captured() {
        Some(captured) => {
            ResultResolver::resolve(
                detected.profile,
                captured,
                &interceptors,
                level,
                hooks,
                None,
            )
            .await
        }
        None => Resolution {
            value: None,
            origin: ResolutionOrigin::Unresolved,
        },
    };

    let verification = if outcome == AttemptOutcome::Cancelled {
        TestVerificationResult {
            passed: false,
            passed_tests: Vec::new(),
            failed_tests: Vec::new(),
            message: "run cancelled".to_string(),
        }
    } else {
        TestCaseVerifier::verify(&program, &detected, level, resolution.value.as_ref(), budget)
            .await
    };

    let mut learner_messages = Vec::new();
    if outcome == AttemptOutcome::TimedOut {
        learner_messages.push(LearnerMessage::ProbableInfiniteLoop);
    }
    if outcome != AttemptOutcome::Cancelled && !resolution.is_resolved() {
        learner_messages.push(LearnerMessage::CouldNotDetermineResult);
    }
    if !verification.passed && outcome != AttemptOutcome::Cancelled {
        learner_messages.push(LearnerMessage::PrimaryTestFailed);
    }

    Ok(AttemptReport {
        attempt_id: source.attempt_id.clone(),
        level_id: level.id.clone(),
        profile: detected.profile,
        outcome,
        resolution_origin: resolution.origin.clone(),
        resolved_value: resolution.value.as_ref().map(Value::to_json),
        verification,
        learner_messages,
        finished_at: Utc::now(),
    })
}

fn unparseable_report(source: &SourceProgram, level: &LevelConfig) -> AttemptReport {
    let has_primary = level.test_cases.iter().any(|c| c.is_primary);
    AttemptReport {
        attempt_id: source.attempt_id.clone(),
        level_id: level.id.clone(),
        profile: AlgorithmProfile::Generic,
        outcome: AttemptOutcome::Faulted,
        resolution_origin: ResolutionOrigin::Unresolved,
        resolved_value: None,
        verification: TestVerificationResult {
            passed: !has_primary,
            passed_tests: Vec::new(),
            failed_tests: Vec::new(),
            message: "source could not be parsed".to_string(),
        },
        learner_messages: vec![LearnerMessage::CouldNotDetermineResult],
        finished_at: Utc::now(),
    }
}
