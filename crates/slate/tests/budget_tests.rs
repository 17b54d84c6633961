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

use slate::{
    parse_program, run_attempt, AlgorithmDetector, AttemptOutcome, BudgetConfig,
    EnvelopeAssembler, ExecutionBudget, HookRegistry, InstrumentationRewriter, InterceptorSet,
    LearnerMessage, LevelConfig, LevelData, ProfileFlags, RunOutcome, RunState, SandboxedExecutor,
    SourceProgram,
};
use std::time::Duration;

fn looping_level() -> LevelConfig {
    LevelConfig {
        id: "budget-test".to_string(),
        flags: ProfileFlags {
            subset_sum: true,
            ..ProfileFlags::default()
        },
        data: LevelData {
            arr: Some(vec![1.0, 2.0]),
            target_sum: Some(99.0),
            ..LevelData::default()
        },
        budget: BudgetConfig {
            steps: 5_000,
            wall_clock_ms: 2_000,
        },
        ..LevelConfig::default()
    }
}

#[tokio::test]
async fn test_infinite_recursion_is_abandoned_by_budget() {
    let level = looping_level();
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(
        r"
        function subsetSum(arr, index, sum, target_sum) {
            return subsetSum(arr, index, sum, target_sum);
        }
        var result = subsetSum(arr, 0, 0, target_sum);
        ",
        level.id.clone(),
    );
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::TimedOut);
    assert!(report
        .learner_messages
        .contains(&LearnerMessage::ProbableInfiniteLoop));
}

#[tokio::test]
async fn test_infinite_loop_is_abandoned_by_step_counter() {
    let level = looping_level();
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(
        r"
        function subsetSum(arr, index, sum, target_sum) {
            while (true) {
                index = index + 0;
            }
        }
        var result = subsetSum(arr, 0, 0, target_sum);
        ",
        level.id.clone(),
    );
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::TimedOut);
}

#[tokio::test]
async fn test_interceptor_records_do_not_leak_across_runs() {
    let program = parse_program(
        r"
        function solve(row) {
            if (row == n) { return true; }
            for (var col = 0; col < n; col++) {
                if (safe(row, col)) {
                    place(row, col);
                    if (solve(row + 1)) { return true; }
                    remove(row, col);
                }
            }
            return false;
        }
        var result = solve(0);
        ",
    )
    .unwrap();
    let level = LevelConfig {
        id: "queens-reset".to_string(),
        data: LevelData {
            n: Some(4),
            ..LevelData::default()
        },
        ..LevelConfig::default()
    };
    let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
    let instrumented = InstrumentationRewriter::instrument(program, &detected);
    let envelope = EnvelopeAssembler::assemble(&level, &detected, instrumented);

    let hooks = HookRegistry::new();
    let mut executor = SandboxedExecutor::new(ExecutionBudget::default());
    let mut interceptors = InterceptorSet::new();

    let first = executor.execute(&envelope, &hooks, &mut interceptors).await;
    assert!(matches!(first, RunOutcome::Completed(_)));
    assert_eq!(interceptors.len(), 4);

    // The second run starts from a clean record-set even though the same
    // set instance is reused.
    let trivial = parse_program("var result = 1;").unwrap();
    let trivial_detected = AlgorithmDetector::detect(&trivial, &ProfileFlags::default());
    let trivial_envelope = EnvelopeAssembler::assemble(
        &LevelConfig::default(),
        &trivial_detected,
        InstrumentationRewriter::instrument(trivial, &trivial_detected),
    );
    let second = executor
        .execute(&trivial_envelope, &hooks, &mut interceptors)
        .await;
    assert!(matches!(second, RunOutcome::Completed(_)));
    assert!(interceptors.is_empty());
    assert!(!interceptors.has_observed_any());
}

#[tokio::test]
async fn test_cancellation_returns_to_idle_and_clears_records() {
    let program = parse_program(
        r"
        function solve(row) {
            if (row == n) { return true; }
            for (var col = 0; col < n; col++) {
                if (safe(row, col)) {
                    place(row, col);
                    if (solve(row + 1)) { return true; }
                    remove(row, col);
                }
            }
            return false;
        }
        var result = solve(0);
        ",
    )
    .unwrap();
    let level = LevelConfig {
        id: "queens-cancel".to_string(),
        data: LevelData {
            n: Some(6),
            ..LevelData::default()
        },
        ..LevelConfig::default()
    };
    let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
    let instrumented = InstrumentationRewriter::instrument(program, &detected);
    let envelope = EnvelopeAssembler::assemble(&level, &detected, instrumented);

    let mut executor = SandboxedExecutor::new(ExecutionBudget {
        steps: 1_000_000,
        wall_clock: Duration::from_secs(10),
    });
    let cancel = executor.cancel_handle();
    let mut hooks = HookRegistry::new();
    hooks.register_fn("piece_place", move |_| {
        cancel.cancel();
        Ok(())
    });
    let mut interceptors = InterceptorSet::new();
    let outcome = executor.execute(&envelope, &hooks, &mut interceptors).await;

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(executor.state(), RunState::Idle);
    assert!(interceptors.is_empty());
}

#[tokio::test]
async fn test_fault_is_captured_not_propagated() {
    let level = LevelConfig {
        id: "faulting".to_string(),
        ..LevelConfig::default()
    };
    let hooks = HookRegistry::new();
    // Calling an unknown function faults the envelope; the pipeline still
    // returns a report.
    let source = SourceProgram::new("var result = mystery();", level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::Faulted);
}
