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

const FLAG_STYLE_SOLVER: &str = r"
var done = false;
function solve(row) {
    if (row == n) {
        done = true;
    } else {
        for (var col = 0; col < n; col++) {
            if (!done) {
                if (safe(row, col)) {
                    place(row, col);
                    solve(row + 1);
                    if (!done) {
                        remove(row, col);
                    }
                }
            }
        }
    }
}
solve(0);
";

fn queens_level(n: u32) -> LevelConfig {
    LevelConfig {
        id: format!("queens-{n}"),
        flags: ProfileFlags {
            n_queens: true,
            ..ProfileFlags::default()
        },
        data: LevelData {
            n: Some(n),
            ..LevelData::default()
        },
        ..LevelConfig::default()
    }
}

#[tokio::test]
async fn test_interceptor_log_reconstructs_solution_without_return_value() {
    let level = queens_level(4);
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(FLAG_STYLE_SOLVER, level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();

    assert_eq!(report.outcome, AttemptOutcome::Completed);
    assert_eq!(report.resolution_origin, ResolutionOrigin::InterceptorLog);
    assert_eq!(
        report.resolved_value,
        Some(json!([[0.0, 1.0], [1.0, 3.0], [2.0, 0.0], [3.0, 2.0]]))
    );
    assert!(report.learner_messages.is_empty());
}

#[tokio::test]
async fn test_learner_primitive_definitions_are_forwarded_to() {
    // Learner supplies their own place/remove over a parallel `queens`
    // accumulator; the interceptor still records every decision.
    let level = queens_level(4);
    let hooks = HookRegistry::new();
    let source = SourceProgram::new(
        r"
        var queens = [];
        function place(row, col) {
            board[row][col] = 1;
            queens.push(row);
        }
        function remove(row, col) {
            board[row][col] = 0;
            queens.pop();
        }
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
        level.id.clone(),
    );
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.outcome, AttemptOutcome::Completed);
    // The learner's own return value wins the priority chain.
    assert_eq!(report.resolution_origin, ResolutionOrigin::Direct);
    assert_eq!(report.resolved_value, Some(json!(true)));
}

#[tokio::test]
async fn test_reference_solver_rescues_empty_run() {
    // No solver at all: the level claims N-Queens, nothing executes, and the
    // canonical re-solve still hands the visualization a valid answer.
    let level = queens_level(4);
    let hooks = HookRegistry::new();
    let source = SourceProgram::new("var x = 1;", level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await.unwrap();
    assert_eq!(report.resolution_origin, ResolutionOrigin::ReferenceSolver);
    let positions = report.resolved_value.unwrap();
    let positions = positions.as_array().unwrap();
    assert_eq!(positions.len(), 4);
}
