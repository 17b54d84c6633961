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

use serde_json::json;
use slate::{
    run_attempt, AttemptOutcome, HookRegistry, LevelConfig, LevelData, ProfileFlags,
    ResolutionOrigin, SourceProgram,
};
use std::sync::{Arc, Mutex};

const SUBSET_SUM_SOURCE: &str = r"
function subsetSum(arr, index, sum, target_sum) {
    if (sum == target_sum) {
        return true;
    }
    if (index >= arr.length) {
        return false;
    }
    if (subsetSum(arr, index + 1, sum + arr[index], target_sum)) {
        return true;
    }
    return subsetSum(arr, index + 1, sum, target_sum);
}
var result = subsetSum(arr, 0, 0, target_sum);
";

fn subset_sum_level(arr: &[f64], target: f64) -> LevelConfig {
    LevelConfig {
        id: "subset-sum-test".to_string(),
        flags: ProfileFlags {
            subset_sum: true,
            ..ProfileFlags::default()
        },
        data: LevelData {
            arr: Some(arr.to_vec()),
            target_sum: Some(target),
            ..LevelData::default()
        },
        ..LevelConfig::default()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("slate=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_subset_sum_run_produces_true_and_hooks_per_call() {
    init_tracing();
    // arr = [3, 4, 2], target 9: the include-first search succeeds after
    // exactly four calls, observing (index, target_sum - sum) each time.
    let level = subset_sum_level(&[3.0, 4.0, 2.0], 9.0);
    let events: Arc<Mutex<Vec<Vec<serde_json::Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let mut hooks = HookRegistry::new();
    hooks.register_fn("cell_update", move |event| {
        sink.lock()
            .unwrap()
            .push(event.args.iter().map(slate::Value::to_json).collect());
        Ok(())
    });

    let source = SourceProgram::new(SUBSET_SUM_SOURCE, level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();

    assert_eq!(report.outcome, AttemptOutcome::Completed);
    assert_eq!(report.resolution_origin, ResolutionOrigin::Direct);
    assert_eq!(report.resolved_value, Some(json!(true)));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0][0], json!(0.0));
    assert_eq!(events[0][1], json!(9.0));
    assert_eq!(events[1][1], json!(6.0));
    assert_eq!(events[2][1], json!(2.0));
    assert_eq!(events[3][1], json!(0.0));
}

#[tokio::test]
async fn test_subset_sum_level_bank_end_to_end() {
    let level = subset_sum_level(&[3.0, 34.0, 4.0, 12.0, 5.0, 2.0], 9.0);
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(SUBSET_SUM_SOURCE, level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::Completed);
    assert_eq!(report.resolved_value, Some(json!(true)));
    assert!(report.learner_messages.is_empty());
}

#[tokio::test]
async fn test_resolver_prefers_result_over_solution() {
    let level = LevelConfig {
        id: "generic-priority".to_string(),
        ..LevelConfig::default()
    };
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(
        r"
        var result = [1, 2];
        var solution = [3, 4];
        ",
        level.id.clone(),
    );
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.resolution_origin, ResolutionOrigin::Direct);
    assert_eq!(report.resolved_value, Some(json!([1.0, 2.0])));
}

#[tokio::test]
async fn test_empty_result_array_falls_through_to_solution() {
    let level = LevelConfig {
        id: "generic-empty-array".to_string(),
        ..LevelConfig::default()
    };
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(
        r"
        var result = [];
        var solution = [3, 4];
        ",
        level.id.clone(),
    );
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.resolution_origin, ResolutionOrigin::SolutionVariable);
    assert_eq!(report.resolved_value, Some(json!([3.0, 4.0])));
}

#[tokio::test]
async fn test_detection_and_report_are_repeatable() {
    let level = subset_sum_level(&[3.0, 4.0, 2.0], 9.0);
    let hooks = HookRegistry::new();
    let first = run_attempt(
        &SourceProgram::new(SUBSET_SUM_SOURCE, level.id.clone()),
        &level,
        &hooks,
    )
    .await
    .unwrap();
    let second = run_attempt(
        &SourceProgram::new(SUBSET_SUM_SOURCE, level.id.clone()),
        &level,
        &hooks,
    )
    .await
    .unwrap();
    assert_eq!(first.profile, second.profile);
    assert_eq!(first.resolved_value, second.resolved_value);
}

#[tokio::test]
async fn test_unparseable_source_reports_not_crashes() {
    let level = LevelConfig {
        id: "broken-source".to_string(),
        ..LevelConfig::default()
    };
    let hooks = HookRegistry::new();
    let source = SourceProgram::new("function (((", level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::Faulted);
    assert_eq!(report.resolution_origin, ResolutionOrigin::Unresolved);
    assert!(report
        .learner_messages
        .contains(&slate::LearnerMessage::CouldNotDetermineResult));
}

#[tokio::test]
async fn test_broken_hook_never_aborts_the_run() {
    let level = subset_sum_level(&[3.0, 4.0, 2.0], 9.0);
    let mut hooks = HookRegistry::new();
    hooks.register_fn("cell_update", |event| {
        Err(slate::runtime::HookError {
            hook: event.hook.clone(),
            message: "renderer crashed".to_string(),
        })
    });
    let source = SourceProgram::new(SUBSET_SUM_SOURCE, level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::Completed);
    assert_eq!(report.resolved_value, Some(json!(true)));
}
