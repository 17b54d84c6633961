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

use crate::ast::{BinaryOp, Expr, Item, Literal, Program, Stmt};
use crate::detector::{AlgorithmProfile, DetectedProgram, EntryPoint};
use crate::level::{LevelConfig, LevelData};

#[derive(Debug, Clone)]
pub struct ExecutionEnvelope {
    pub level_id: String,
    pub preamble: Vec<Stmt>,
    pub init: Vec<Stmt>,
    pub instrumented: Program,
    pub fallback: Vec<Stmt>,
    pub epilogue: Vec<Stmt>,
    combined: Program,
}

impl ExecutionEnvelope {
    pub fn program(&self) -> &Program {
        &self.combined
    }
}

pub struct EnvelopeAssembler;

impl EnvelopeAssembler {
    pub fn assemble(
        level: &LevelConfig,
        detected: &DetectedProgram,
        instrumented: Program,
    ) -> ExecutionEnvelope {
        let preamble = vec![
            Stmt::Let {
                name: "__viz_active".to_string(),
                init: Some(Expr::Literal(Literal::Bool(true))),
            },
            Stmt::Let {
                name: "__result".to_string(),
                init: Some(Expr::Literal(Literal::Undefined)),
            },
        ];
        let init = init_declarations(detected.profile, &level.data);
        let fallback = detected
            .entry
            .as_ref()
            .map(|entry| fallback_invocation(entry, &level.data))
            .unwrap_or_default();
        let epilogue = vec![
            Stmt::Assign {
                target: crate::ast::AssignTarget {
                    name: "__viz_active".to_string(),
                    indices: Vec::new(),
                },
                value: Expr::Literal(Literal::Bool(false)),
            },
            Stmt::Expr(Expr::call("__capture_results", Vec::new())),
        ];

        let mut combined = Program::default();
        combined
            .items
            .extend(preamble.iter().cloned().map(Item::Stmt));
        combined.items.extend(init.iter().cloned().map(Item::Stmt));
        combined.items.extend(instrumented.items.iter().cloned());
        combined
            .items
            .extend(fallback.iter().cloned().map(Item::Stmt));
        combined
            .items
            .extend(epilogue.iter().cloned().map(Item::Stmt));

        ExecutionEnvelope {
            level_id: level.id.clone(),
            preamble,
            init,
            instrumented,
            fallback,
            epilogue,
            combined,
        }
    }
}

fn number_array(values: &[f64]) -> Expr {
    Expr::Literal(Literal::Array(values.iter().map(|v| Expr::number(*v)).collect()))
}

fn let_stmt(name: &str, init: Expr) -> Stmt {
    Stmt::Let {
        name: name.to_string(),
        init: Some(init),
    }
}

fn init_declarations(profile: AlgorithmProfile, data: &LevelData) -> Vec<Stmt> {
    let mut out = Vec::new();
    if let Some(arr) = &data.arr {
        out.push(let_stmt("arr", number_array(arr)));
    }
    if let Some(target) = data.target_sum {
        out.push(let_stmt("target_sum", Expr::number(target)));
    }
    if let Some(weights) = &data.weights {
        out.push(let_stmt("weights", number_array(weights)));
    }
    if let Some(values) = &data.values {
        out.push(let_stmt("values", number_array(values)));
    }
    if let Some(capacity) = data.capacity {
        out.push(let_stmt("capacity", Expr::number(capacity)));
    }
    if let Some(coins) = &data.coins {
        out.push(let_stmt("coins", number_array(coins)));
    }
    if let Some(amount) = data.amount {
        out.push(let_stmt("amount", Expr::number(amount)));
    }
    if let Some(rows) = data.rows {
        out.push(let_stmt("rows", Expr::number(f64::from(rows))));
    }
    if let Some(cols) = data.cols {
        out.push(let_stmt("cols", Expr::number(f64::from(cols))));
    }
    if let Some(grid) = &data.grid {
        let rows: Vec<Expr> = grid.iter().map(|row| number_array(row)).collect();
        out.push(let_stmt("grid", Expr::Literal(Literal::Array(rows))));
    }
    if let Some((row, col)) = data.start {
        out.push(let_stmt("start_row", Expr::number(f64::from(row))));
        out.push(let_stmt("start_col", Expr::number(f64::from(col))));
    }
    if let Some((row, col)) = data.goal {
        out.push(let_stmt("goal_row", Expr::number(f64::from(row))));
        out.push(let_stmt("goal_col", Expr::number(f64::from(col))));
    }
    if let Some(length) = data.rope_length {
        out.push(let_stmt("rope_length", Expr::number(length)));
    }
    if let Some(arrivals) = &data.arrivals {
        out.push(let_stmt("arrivals", number_array(arrivals)));
    }
    if let Some(departures) = &data.departures {
        out.push(let_stmt("departures", number_array(departures)));
    }
    if let Some(limit) = data.limit {
        out.push(let_stmt("limit", Expr::number(limit)));
    }

    match profile {
        AlgorithmProfile::NQueensBacktrack => {
            let n = data.n.unwrap_or(8);
            out.push(let_stmt("n", Expr::number(f64::from(n))));
            let board_rows: Vec<Expr> = (0..n)
                .map(|_| number_array(&vec![0.0; n as usize]))
                .collect();
            out.push(let_stmt("board", Expr::Literal(Literal::Array(board_rows))));
        }
        AlgorithmProfile::RopePartitionBacktrack => {
            out.push(let_stmt("cuts", Expr::Literal(Literal::Array(Vec::new()))));
        }
        _ => {
            if let Some(n) = data.n {
                out.push(let_stmt("n", Expr::number(f64::from(n))));
            }
        }
    }
    out
}

fn fallback_invocation(entry: &EntryPoint, data: &LevelData) -> Vec<Stmt> {
    let args: Vec<Expr> = entry
        .params
        .iter()
        .map(|param| default_argument(param, data))
        .collect();
    let not_defined = |name: &str| Expr::Unary {
        op: crate::ast::UnaryOp::Not,
        expr: Box::new(Expr::call("__defined", vec![Expr::string(name)])),
    };
    let no_result_yet = Expr::Binary {
        op: BinaryOp::Eq,
        left: Box::new(Expr::var("__result")),
        right: Box::new(Expr::Literal(Literal::Undefined)),
    };
    let condition = Expr::Binary {
        op: BinaryOp::And,
        left: Box::new(Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(no_result_yet),
            right: Box::new(not_defined("result")),
        }),
        right: Box::new(not_defined("solution")),
    };
    vec![Stmt::If {
        condition,
        then_branch: vec![Stmt::Assign {
            target: crate::ast::AssignTarget {
                name: "__result".to_string(),
                indices: Vec::new(),
            },
            value: Expr::call(entry.name.clone(), args),
        }],
        else_branch: None,
    }]
}

fn default_argument(param: &str, data: &LevelData) -> Expr {
    match param {
        "arr" => {
            if data.arr.is_some() {
                Expr::var("arr")
            } else {
                Expr::Literal(Literal::Array(Vec::new()))
            }
        }
        "target_sum" | "target" if data.target_sum.is_some() => Expr::var("target_sum"),
        "coins" if data.coins.is_some() => Expr::var("coins"),
        "amount" if data.amount.is_some() => Expr::var("amount"),
        "capacity" if data.capacity.is_some() => Expr::var("capacity"),
        "limit" if data.limit.is_some() => Expr::var("limit"),
        "weights" if data.weights.is_some() => Expr::var("weights"),
        "values" if data.values.is_some() => Expr::var("values"),
        "grid" if data.grid.is_some() => Expr::var("grid"),
        "rows" if data.rows.is_some() => Expr::var("rows"),
        "cols" if data.cols.is_some() => Expr::var("cols"),
        "board" => Expr::var("board"),
        "rope_length" | "length" if data.rope_length.is_some() => Expr::var("rope_length"),
        "arrivals" if data.arrivals.is_some() => Expr::var("arrivals"),
        "departures" if data.departures.is_some() => Expr::var("departures"),
        "n" => {
            if data.n.is_some() {
                Expr::var("n")
            } else if data.weights.is_some() {
                Expr::Member {
                    object: Box::new(Expr::var("weights")),
                    name: "length".to_string(),
                }
            } else if data.arr.is_some() {
                Expr::Member {
                    object: Box::new(Expr::var("arr")),
                    name: "length".to_string(),
                }
            } else {
                Expr::number(0.0)
            }
        }
        _ => Expr::number(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::AlgorithmDetector;
    use crate::level::ProfileFlags;
    use crate::parser::parse_program;
    use crate::rewriter::InstrumentationRewriter;

    fn subset_sum_level() -> LevelConfig {
        LevelConfig {
            id: "subset-sum-1".to_string(),
            data: LevelData {
                arr: Some(vec![3.0, 34.0, 4.0, 12.0, 5.0, 2.0]),
                target_sum: Some(9.0),
                ..LevelData::default()
            },
            ..LevelConfig::default()
        }
    }

    #[test]
    fn test_sections_keep_fixed_order() {
        let program = parse_program(
            r"
            function subsetSum(arr, index, sum, target_sum) {
                return sum == target_sum;
            }
            ",
        )
        .unwrap();
        let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
        let instrumented = InstrumentationRewriter::instrument(program, &detected);
        let level = subset_sum_level();
        let envelope = EnvelopeAssembler::assemble(&level, &detected, instrumented);

        let total = envelope.preamble.len()
            + envelope.init.len()
            + envelope.instrumented.items.len()
            + envelope.fallback.len()
            + envelope.epilogue.len();
        assert_eq!(envelope.program().items.len(), total);
        // Preamble leads, epilogue trails.
        assert!(matches!(
            &envelope.program().items[0],
            Item::Stmt(Stmt::Let { name, .. }) if name == "__viz_active"
        ));
        assert!(matches!(
            envelope.program().items.last(),
            Some(Item::Stmt(Stmt::Expr(Expr::Call { .. })))
        ));
    }

    #[test]
    fn test_nqueens_scaffold_declares_board() {
        let program = parse_program(
            r"
            function solve(row) {
                if (safe(row, 0)) { place(row, 0); }
                return false;
            }
            ",
        )
        .unwrap();
        let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
        let instrumented = InstrumentationRewriter::instrument(program, &detected);
        let level = LevelConfig {
            id: "queens-4".to_string(),
            data: LevelData {
                n: Some(4),
                ..LevelData::default()
            },
            ..LevelConfig::default()
        };
        let envelope = EnvelopeAssembler::assemble(&level, &detected, instrumented);
        let declared: Vec<&str> = envelope
            .init
            .iter()
            .filter_map(|s| match s {
                Stmt::Let { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(declared, vec!["n", "board"]);
    }
}
