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

use crate::detector::AlgorithmProfile;
use crate::level::LevelConfig;
use crate::logging;
use crate::runtime::interceptor::InterceptorSet;
use crate::runtime::{hooks, CapturedOutcome, HookEvent, HookRegistry, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOrigin {
    Direct,
    SolutionVariable,
    NamedOutput(String),
    InterceptorLog,
    BoardSnapshot,
    ReferenceSolver,
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub value: Option<Value>,
    pub origin: ResolutionOrigin,
}

impl Resolution {
    fn resolved(value: Value, origin: ResolutionOrigin) -> Self {
        Self {
            value: Some(value),
            origin,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

fn named_outputs(profile: AlgorithmProfile) -> &'static [&'static str] {
    match profile {
        AlgorithmProfile::TrainSchedule => &["platforms", "platform_count", "count"],
        AlgorithmProfile::RopePartitionBacktrack => &["max_cuts", "cuts"],
        AlgorithmProfile::MaxCapacity => &["boats", "count"],
        AlgorithmProfile::Knapsack => &["max_value", "best"],
        AlgorithmProfile::GridDp => &["paths", "min_cost"],
        _ => &[],
    }
}

pub struct ResultResolver;

impl ResultResolver {
    pub async fn resolve(
        profile: AlgorithmProfile,
        captured: &CapturedOutcome,
        interceptors: &InterceptorSet,
        level: &LevelConfig,
        hooks: &HookRegistry,
        replay_throttle: Option<Duration>,
    ) -> Resolution {
        let resolution = Self::resolve_inner(
            profile,
            captured,
            interceptors,
            level,
            hooks,
            replay_throttle,
        )
        .await;
        logging::log_resolution(
            match &resolution.origin {
                ResolutionOrigin::Direct => "direct",
                ResolutionOrigin::SolutionVariable => "solution_variable",
                ResolutionOrigin::NamedOutput(_) => "named_output",
                ResolutionOrigin::InterceptorLog => "interceptor_log",
                ResolutionOrigin::BoardSnapshot => "board_snapshot",
                ResolutionOrigin::ReferenceSolver => "reference_solver",
                ResolutionOrigin::Unresolved => "unresolved",
            },
            &level.id,
        );
        resolution
    }

    async fn resolve_inner(
        profile: AlgorithmProfile,
        captured: &CapturedOutcome,
        interceptors: &InterceptorSet,
        level: &LevelConfig,
        hooks: &HookRegistry,
        replay_throttle: Option<Duration>,
    ) -> Resolution {
        // 1. Direct return value or conventional `result` variable.
        if let Some(direct) = &captured.direct {
            if direct.is_usable_result() {
                return Resolution::resolved(direct.clone(), ResolutionOrigin::Direct);
            }
        }
        if let Some(result) = captured.global("result") {
            if result.is_usable_result() {
                return Resolution::resolved(result.clone(), ResolutionOrigin::Direct);
            }
        }

        // 2. A named `solution` variable, same non-empty-array rule.
        if let Some(solution) = captured.global("solution") {
            if solution.is_usable_result() {
                return Resolution::resolved(solution.clone(), ResolutionOrigin::SolutionVariable);
            }
        }

        // 3. Profile-specific named outputs.
        for name in named_outputs(profile) {
            if let Some(value) = captured.global(name) {
                if value.is_usable_result() {
                    return Resolution::resolved(
                        value.clone(),
                        ResolutionOrigin::NamedOutput((*name).to_string()),
                    );
                }
            }
        }

        // 4. The interceptor record-set, taken verbatim.
        if !interceptors.is_empty() {
            return Resolution::resolved(interceptors.to_value(), ResolutionOrigin::InterceptorLog);
        }

        // 5. Snapshot reconstruction from a board-shaped structure.
        if let Some(board) = captured.global("board") {
            let positions = occupied_positions(board);
            if !positions.is_empty() {
                return Resolution::resolved(
                    positions_value(&positions),
                    ResolutionOrigin::BoardSnapshot,
                );
            }
        }

        // 6. Canonical re-solve, with optional throttled hook replay.
        if let Some(value) = reference_solution(profile, level) {
            if let Some(throttle) = replay_throttle {
                replay_placements(&value, hooks, throttle).await;
            }
            return Resolution::resolved(value, ResolutionOrigin::ReferenceSolver);
        }

        Resolution {
            value: None,
            origin: ResolutionOrigin::Unresolved,
        }
    }
}

fn occupied_positions(board: &Value) -> Vec<(usize, usize)> {
    let mut positions = Vec::new();
    let Value::Array(rows) = board else {
        return positions;
    };
    for (r, row) in rows.borrow().iter().enumerate() {
        let Value::Array(cells) = row else {
            return Vec::new();
        };
        for (c, cell) in cells.borrow().iter().enumerate() {
            if cell.as_number().is_some_and(|v| v != 0.0) {
                positions.push((r, c));
            }
        }
    }
    positions
}

fn positions_value(positions: &[(usize, usize)]) -> Value {
    Value::array(
        positions
            .iter()
            .map(|&(r, c)| Value::array(vec![Value::Number(r as f64), Value::Number(c as f64)]))
            .collect(),
    )
}

fn reference_solution(profile: AlgorithmProfile, level: &LevelConfig) -> Option<Value> {
    match profile {
        AlgorithmProfile::NQueensBacktrack => {
            let n = level.data.n.unwrap_or(8) as usize;
            solve_n_queens(n).map(|positions| positions_value(&positions))
        }
        AlgorithmProfile::SubsetSumBacktrack => {
            let arr = level.data.arr.as_deref()?;
            let target = level.data.target_sum?;
            Some(Value::Bool(subset_sum_exists(arr, 0, target)))
        }
        AlgorithmProfile::CoinChangeBacktrack => {
            let coins = level.data.coins.as_deref()?;
            let amount = level.data.amount?;
            Some(Value::Number(coin_change_count(coins, amount, 0)))
        }
        _ => None,
    }
}

async fn replay_placements(value: &Value, hooks: &HookRegistry, throttle: Duration) {
    let Value::Array(items) = value else {
        return;
    };
    let placements: Vec<Value> = items.borrow().iter().cloned().collect();
    for placement in placements {
        let Value::Array(pair) = &placement else {
            continue;
        };
        let mut args: Vec<Value> = pair.borrow().iter().cloned().collect();
        args.push(Value::Str("replay".to_string()));
        hooks.dispatch(&HookEvent {
            hook: hooks::PIECE_PLACE.to_string(),
            args,
        });
        tokio::time::sleep(throttle).await;
    }
}

pub fn solve_n_queens(n: usize) -> Option<Vec<(usize, usize)>> {
    fn attack_free(placed: &[usize], row: usize, col: usize) -> bool {
        placed.iter().enumerate().all(|(r, &c)| {
            c != col && (row - r) != col.abs_diff(c)
        })
    }
    fn place_row(n: usize, placed: &mut Vec<usize>) -> bool {
        let row = placed.len();
        if row == n {
            return true;
        }
        for col in 0..n {
            if attack_free(placed, row, col) {
                placed.push(col);
                if place_row(n, placed) {
                    return true;
                }
                placed.pop();
            }
        }
        false
    }
    let mut placed = Vec::with_capacity(n);
    place_row(n, &mut placed).then(|| {
        placed
            .iter()
            .enumerate()
            .map(|(row, &col)| (row, col))
            .collect()
    })
}

pub fn subset_sum_exists(arr: &[f64], index: usize, remaining: f64) -> bool {
    if remaining == 0.0 {
        return true;
    }
    if index >= arr.len() || remaining < 0.0 {
        return false;
    }
    subset_sum_exists(arr, index + 1, remaining - arr[index])
        || subset_sum_exists(arr, index + 1, remaining)
}

pub fn coin_change_count(coins: &[f64], amount: f64, index: usize) -> f64 {
    if amount == 0.0 {
        return 1.0;
    }
    if amount < 0.0 || index >= coins.len() {
        return 0.0;
    }
    coin_change_count(coins, amount - coins[index], index)
        + coin_change_count(coins, amount, index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_queens_reference_solution_is_valid() {
        let solution = solve_n_queens(4).unwrap();
        assert_eq!(solution.len(), 4);
        for (i, &(r1, c1)) in solution.iter().enumerate() {
            for &(r2, c2) in &solution[i + 1..] {
                assert_ne!(c1, c2);
                assert_ne!(r1.abs_diff(r2), c1.abs_diff(c2));
            }
        }
    }

    #[test]
    fn test_subset_sum_reference() {
        let arr = [3.0, 34.0, 4.0, 12.0, 5.0, 2.0];
        assert!(subset_sum_exists(&arr, 0, 9.0));
        assert!(!subset_sum_exists(&arr, 0, 1.0));
    }

    #[test]
    fn test_coin_change_reference() {
        assert_eq!(coin_change_count(&[1.0, 5.0], 6.0, 0), 2.0);
        assert_eq!(coin_change_count(&[2.0], 3.0, 0), 0.0);
    }
}
