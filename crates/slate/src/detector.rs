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

use crate::ast::{FunctionDecl, Program};
use crate::level::ProfileFlags;
use crate::logging;
use crate::rewriter::IMPL_PREFIX;
use crate::runtime::interceptor;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmProfile {
    GraphTraversal,
    Knapsack,
    SubsetSumBacktrack,
    CoinChangeBacktrack,
    NQueensBacktrack,
    GridDp,
    RopePartitionBacktrack,
    TrainSchedule,
    MaxCapacity,
    Generic,
}

// Detection order. First structural match wins; backtracking families come
// before their tabulated cousins.
pub const PRIORITY: &[AlgorithmProfile] = &[
    AlgorithmProfile::NQueensBacktrack,
    AlgorithmProfile::SubsetSumBacktrack,
    AlgorithmProfile::CoinChangeBacktrack,
    AlgorithmProfile::RopePartitionBacktrack,
    AlgorithmProfile::Knapsack,
    AlgorithmProfile::GridDp,
    AlgorithmProfile::GraphTraversal,
    AlgorithmProfile::TrainSchedule,
    AlgorithmProfile::MaxCapacity,
];

const DP_TABLE_IDENTS: &[&str] = &["dp", "table", "memo", "cache"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub params: Vec<String>,
}

impl From<&FunctionDecl> for EntryPoint {
    fn from(decl: &FunctionDecl) -> Self {
        Self {
            name: decl.name.clone(),
            params: decl.params.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedProgram {
    pub profile: AlgorithmProfile,
    pub entry: Option<EntryPoint>,
    pub signature_missing: bool,
    pub already_instrumented: bool,
}

static SUFFIXED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>[A-Za-z_][A-Za-z0-9_]*?)(?P<suffix>\d*)$").unwrap());

fn entry_bases(profile: AlgorithmProfile) -> &'static [&'static str] {
    match profile {
        AlgorithmProfile::GraphTraversal => &["bfs", "dfs", "traverse", "visitNode"],
        AlgorithmProfile::Knapsack => &["knapsack", "knapSack"],
        AlgorithmProfile::SubsetSumBacktrack => &["subsetSum", "isSubsetSum"],
        AlgorithmProfile::CoinChangeBacktrack => &["coinChange", "countCoins", "makeChange"],
        AlgorithmProfile::NQueensBacktrack => &["solve", "solveNQueens", "placeQueens", "nQueens"],
        AlgorithmProfile::GridDp => &["gridPaths", "uniquePaths", "minPathSum"],
        AlgorithmProfile::RopePartitionBacktrack => &["ropeCut", "cutRope", "maxCuts"],
        AlgorithmProfile::TrainSchedule => &["trainSchedule", "minPlatforms", "schedule"],
        AlgorithmProfile::MaxCapacity => &["maxCapacity", "numRescueBoats", "boatCapacity"],
        AlgorithmProfile::Generic => &[],
    }
}

fn base_matches(name: &str, bases: &[&str]) -> bool {
    let Some(caps) = SUFFIXED_NAME.captures(name) else {
        return false;
    };
    let base = &caps["base"];
    bases.iter().any(|b| *b == base)
}

pub struct AlgorithmDetector;

impl AlgorithmDetector {
    pub fn detect(program: &Program, flags: &ProfileFlags) -> DetectedProgram {
        let already_instrumented = program
            .functions()
            .any(|f| f.name.starts_with(IMPL_PREFIX));

        let structural = PRIORITY
            .iter()
            .find_map(|&profile| Self::structural_match(program, profile).map(|e| (profile, e)));
        let claimed = PRIORITY.iter().copied().find(|&p| flag_set(flags, p));

        let detected = match (claimed, structural) {
            (None, Some((profile, entry))) => DetectedProgram {
                profile,
                entry: Some(entry),
                signature_missing: false,
                already_instrumented,
            },
            (Some(claimed), Some((profile, entry))) if claimed == profile => DetectedProgram {
                profile,
                entry: Some(entry),
                signature_missing: false,
                already_instrumented,
            },
            (Some(claimed), Some((structural_profile, _))) => {
                // Conflicting evidence: the level's declared family wins and
                // the disagreement is an internal diagnostic only.
                logging::log_detector_event(
                    "detection_ambiguity",
                    serde_json::json!({
                        "claimed": format!("{claimed:?}"),
                        "structural": format!("{structural_profile:?}"),
                    }),
                );
                DetectedProgram {
                    profile: claimed,
                    entry: None,
                    signature_missing: true,
                    already_instrumented,
                }
            }
            (Some(claimed), None) => {
                logging::log_detector_event(
                    "signature_missing",
                    serde_json::json!({ "claimed": format!("{claimed:?}") }),
                );
                DetectedProgram {
                    profile: claimed,
                    entry: None,
                    signature_missing: true,
                    already_instrumented,
                }
            }
            (None, None) => DetectedProgram {
                profile: AlgorithmProfile::Generic,
                entry: program.functions().next().map(EntryPoint::from),
                signature_missing: false,
                already_instrumented,
            },
        };

        logging::log_detector_event(
            "profile_detected",
            serde_json::json!({
                "profile": format!("{:?}", detected.profile),
                "entry": detected.entry.as_ref().map(|e| e.name.clone()),
                "signature_missing": detected.signature_missing,
            }),
        );
        detected
    }

    fn structural_match(program: &Program, profile: AlgorithmProfile) -> Option<EntryPoint> {
        let bases = entry_bases(profile);
        // Instrumented programs carry the wrapper under the original name;
        // skip reserved names so re-detection stays stable.
        let candidate = program
            .functions()
            .find(|f| !f.name.starts_with(IMPL_PREFIX) && base_matches(&f.name, bases))?;

        match profile {
            AlgorithmProfile::NQueensBacktrack => {
                let calls = candidate.called_names();
                let uses_primitives = calls.iter().any(|name| interceptor::is_primitive(name));
                uses_primitives.then(|| EntryPoint::from(candidate))
            }
            AlgorithmProfile::SubsetSumBacktrack
            | AlgorithmProfile::CoinChangeBacktrack
            | AlgorithmProfile::RopePartitionBacktrack => {
                let idents = candidate.body_identifiers();
                let tabulated = DP_TABLE_IDENTS.iter().any(|id| idents.contains(*id));
                (!tabulated).then(|| EntryPoint::from(candidate))
            }
            _ => Some(EntryPoint::from(candidate)),
        }
    }
}

fn flag_set(flags: &ProfileFlags, profile: AlgorithmProfile) -> bool {
    match profile {
        AlgorithmProfile::GraphTraversal => flags.graph_traversal,
        AlgorithmProfile::Knapsack => flags.knapsack,
        AlgorithmProfile::SubsetSumBacktrack => flags.subset_sum,
        AlgorithmProfile::CoinChangeBacktrack => flags.coin_change,
        AlgorithmProfile::NQueensBacktrack => flags.n_queens,
        AlgorithmProfile::GridDp => flags.grid_dp,
        AlgorithmProfile::RopePartitionBacktrack => flags.rope_partition,
        AlgorithmProfile::TrainSchedule => flags.train_schedule,
        AlgorithmProfile::MaxCapacity => flags.max_capacity,
        AlgorithmProfile::Generic => false,
    }
}
