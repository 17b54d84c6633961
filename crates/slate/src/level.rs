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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFlags {
    pub graph_traversal: bool,
    pub knapsack: bool,
    pub subset_sum: bool,
    pub coin_change: bool,
    pub n_queens: bool,
    pub grid_dp: bool,
    pub rope_partition: bool,
    pub train_schedule: bool,
    pub max_capacity: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelData {
    pub arr: Option<Vec<f64>>,
    pub target_sum: Option<f64>,
    pub weights: Option<Vec<f64>>,
    pub values: Option<Vec<f64>>,
    pub capacity: Option<f64>,
    pub coins: Option<Vec<f64>>,
    pub amount: Option<f64>,
    pub n: Option<u32>,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub grid: Option<Vec<Vec<f64>>>,
    pub start: Option<(u32, u32)>,
    pub goal: Option<(u32, u32)>,
    pub rope_length: Option<f64>,
    pub arrivals: Option<Vec<f64>>,
    pub departures: Option<Vec<f64>>,
    pub limit: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub steps: u64,
    pub wall_clock_ms: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            steps: 200_000,
            wall_clock_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparison {
    Exact,
    ArrayEquals,
    NumberEquals,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub function_name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub input_params: HashMap<String, Value>,
    pub expected_output: Value,
    pub comparison_type: Comparison,
    #[serde(default)]
    pub label: Option<String>,
}

impl TestCase {
    pub fn display_name(&self, ordinal: usize) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}#{}", self.function_name, ordinal))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub id: String,
    pub flags: ProfileFlags,
    pub data: LevelData,
    pub budget: BudgetConfig,
    pub test_cases: Vec<TestCase>,
}

#[derive(Error, Debug)]
pub enum LevelConfigError {
    #[error("Invalid level configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Function '{0}' has {1} primary test cases; exactly one is allowed")]
    DuplicatePrimary(String, usize),
}

impl LevelConfig {
    pub fn from_json(json: &str) -> Result<Self, LevelConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LevelConfigError> {
        let mut primaries: HashMap<&str, usize> = HashMap::new();
        for case in self.test_cases.iter().filter(|c| c.is_primary) {
            *primaries.entry(case.function_name.as_str()).or_insert(0) += 1;
        }
        for (name, count) in primaries {
            if count > 1 {
                return Err(LevelConfigError::DuplicatePrimary(name.to_string(), count));
            }
        }
        Ok(())
    }

    pub fn cases_for<'a>(&'a self, function_name: &'a str) -> impl Iterator<Item = &'a TestCase> + 'a {
        self.test_cases
            .iter()
            .filter(move |c| c.function_name == function_name)
    }
}
