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

use anyhow::Result;
use serde_json::json;
use slate::{run_attempt, HookRegistry, LevelConfig, SourceProgram};

const LEARNER_SOURCE: &str = r"
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

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let level = LevelConfig::from_json(
        &json!({
            "id": "subset-sum-demo",
            "flags": { "subset_sum": true },
            "data": { "arr": [3.0, 34.0, 4.0, 12.0, 5.0, 2.0], "target_sum": 9.0 },
            "test_cases": [
                {
                    "functionName": "subsetSum",
                    "isPrimary": true,
                    "expectedOutput": true,
                    "comparisonType": "exact"
                },
                {
                    "functionName": "subsetSum",
                    "inputParams": { "arr": [1.0, 2.0, 3.0], "index": 0, "sum": 0, "target_sum": 6.0 },
                    "expectedOutput": true,
                    "comparisonType": "exact",
                    "label": "hidden: 1+2+3"
                }
            ]
        })
        .to_string(),
    )?;

    let mut hooks = HookRegistry::new();
    hooks.register_fn("cell_update", |event| {
        println!("viz {} {:?}", event.hook, event.args);
        Ok(())
    });
    hooks.register_fn("call_return", |event| {
        println!("viz {} {:?}", event.hook, event.args);
        Ok(())
    });

    let source = SourceProgram::new(LEARNER_SOURCE, level.id.clone());
    let report = run_attempt(&source, &level, &hooks).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
