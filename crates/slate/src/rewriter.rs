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

use crate::ast::{Expr, FunctionDecl, Item, Literal, Program, Stmt};
use crate::detector::{AlgorithmProfile, DetectedProgram, EntryPoint};
use crate::logging;
use crate::runtime::interceptor;
use crate::runtime::hooks;
use std::collections::HashSet;
use thiserror::Error;

// Reserved marker prefix; its presence makes every rewrite a no-op.
pub const IMPL_PREFIX: &str = "__impl_";

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Entry function '{0}' not found after detection")]
    AnchorNotFound(String),
}

pub struct InstrumentationRewriter;

impl InstrumentationRewriter {
    pub fn instrument(program: Program, detected: &DetectedProgram) -> Program {
        if detected.already_instrumented
            || program.functions().any(|f| f.name.starts_with(IMPL_PREFIX))
        {
            logging::log_rewriter_event(
                "rewrite_skipped",
                serde_json::json!({ "reason": "already instrumented" }),
            );
            return program;
        }
        let Some(entry) = detected.entry.clone() else {
            // Signature missing: the flagged family has no structural anchor,
            // so skip silently rather than error.
            logging::log_rewriter_event(
                "rewrite_skipped",
                serde_json::json!({ "reason": "no entry point", "profile": format!("{:?}", detected.profile) }),
            );
            return program;
        };

        match Self::apply(program, detected.profile, &entry) {
            Ok(rewritten) => rewritten,
            Err((err, best_effort)) => {
                logging::log_rewriter_event(
                    "rewrite_failure",
                    serde_json::json!({ "error": err.to_string(), "entry": entry.name }),
                );
                best_effort
            }
        }
    }

    fn apply(
        mut program: Program,
        profile: AlgorithmProfile,
        entry: &EntryPoint,
    ) -> Result<Program, (RewriteError, Program)> {
        strip_instructional_stubs(&mut program, &entry.name);

        let Some(index) = program.items.iter().position(
            |item| matches!(item, Item::Function(f) if f.name == entry.name),
        ) else {
            let err = RewriteError::AnchorNotFound(entry.name.clone());
            return Err((err, program));
        };

        let impl_name = format!("{IMPL_PREFIX}{}", entry.name);
        if let Item::Function(decl) = &mut program.items[index] {
            decl.name = impl_name.clone();
            apply_arithmetic_coercion(profile, decl);
        }

        let wrapper = make_wrapper(profile, entry, &impl_name);
        // Wrapper goes immediately before the impl so call order is kept.
        program.items.insert(index, Item::Function(wrapper));

        reorder_entry_call_sites(&mut program, entry);
        Ok(program)
    }
}

fn visit_hook(profile: AlgorithmProfile) -> &'static str {
    match profile {
        AlgorithmProfile::GraphTraversal => hooks::NODE_VISIT,
        AlgorithmProfile::GridDp => hooks::PATH_UPDATE,
        AlgorithmProfile::NQueensBacktrack => hooks::NODE_VISIT,
        AlgorithmProfile::RopePartitionBacktrack => hooks::CUT_PUSH,
        AlgorithmProfile::TrainSchedule => hooks::SCHEDULE_ASSIGN,
        AlgorithmProfile::Knapsack
        | AlgorithmProfile::SubsetSumBacktrack
        | AlgorithmProfile::CoinChangeBacktrack
        | AlgorithmProfile::MaxCapacity => hooks::CELL_UPDATE,
        AlgorithmProfile::Generic => hooks::NODE_VISIT,
    }
}

fn find_param(params: &[String], candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|c| params.iter().find(|p| p.as_str() == *c))
        .cloned()
}

fn cursor_expr(params: &[String]) -> Expr {
    find_param(params, &["index", "row", "i", "node", "n"])
        .or_else(|| params.first().cloned())
        .map_or_else(|| Expr::number(0.0), Expr::var)
}

fn precondition_expr(profile: AlgorithmProfile, params: &[String]) -> Expr {
    match profile {
        AlgorithmProfile::SubsetSumBacktrack => {
            match (
                find_param(params, &["target_sum", "target"]),
                find_param(params, &["sum", "current_sum"]),
            ) {
                (Some(target), Some(sum)) => Expr::Binary {
                    op: crate::ast::BinaryOp::Sub,
                    left: Box::new(Expr::var(target)),
                    right: Box::new(Expr::var(sum)),
                },
                (Some(target), None) => Expr::var(target),
                _ => Expr::number(0.0),
            }
        }
        AlgorithmProfile::Knapsack | AlgorithmProfile::MaxCapacity => {
            find_param(params, &["capacity", "limit", "remaining"])
                .map_or_else(|| Expr::number(0.0), Expr::var)
        }
        AlgorithmProfile::CoinChangeBacktrack => find_param(params, &["amount", "remaining"])
            .map_or_else(|| Expr::number(0.0), Expr::var),
        AlgorithmProfile::RopePartitionBacktrack => {
            find_param(params, &["rope_length", "length", "n"])
                .map_or_else(|| Expr::number(0.0), Expr::var)
        }
        _ => params
            .get(1)
            .cloned()
            .map_or_else(|| Expr::number(0.0), Expr::var),
    }
}

fn make_wrapper(profile: AlgorithmProfile, entry: &EntryPoint, impl_name: &str) -> FunctionDecl {
    let params = &entry.params;
    let delegate_args: Vec<Expr> = params.iter().cloned().map(Expr::var).collect();
    let body = vec![
        Stmt::Let {
            name: "__pre".to_string(),
            init: Some(precondition_expr(profile, params)),
        },
        Stmt::Expr(Expr::call(
            visit_hook(profile),
            vec![cursor_expr(params), Expr::var("__pre"), Expr::string("visit")],
        )),
        Stmt::Let {
            name: "__ret".to_string(),
            init: Some(Expr::call(impl_name, delegate_args)),
        },
        Stmt::Expr(Expr::call(
            hooks::CALL_RETURN,
            vec![cursor_expr(params), Expr::var("__ret"), Expr::string("return")],
        )),
        Stmt::Return(Some(Expr::var("__ret"))),
    ];
    FunctionDecl {
        name: entry.name.clone(),
        params: params.clone(),
        body,
    }
}

fn apply_arithmetic_coercion(profile: AlgorithmProfile, decl: &mut FunctionDecl) {
    if !matches!(
        profile,
        AlgorithmProfile::SubsetSumBacktrack
            | AlgorithmProfile::CoinChangeBacktrack
            | AlgorithmProfile::Knapsack
            | AlgorithmProfile::RopePartitionBacktrack
    ) {
        return;
    }
    let params: HashSet<String> = decl.params.iter().cloned().collect();
    coerce_stmts(&mut decl.body, &params);
}

fn coerce_stmts(stmts: &mut [Stmt], params: &HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { init: Some(e), .. } => coerce_expr(e, params),
            Stmt::Let { init: None, .. } | Stmt::Break | Stmt::Continue | Stmt::Return(None) => {}
            Stmt::Assign { target, value } => {
                for idx in &mut target.indices {
                    coerce_expr(idx, params);
                }
                coerce_expr(value, params);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                coerce_expr(condition, params);
                coerce_stmts(then_branch, params);
                if let Some(eb) = else_branch {
                    coerce_stmts(eb, params);
                }
            }
            Stmt::While { condition, body } => {
                coerce_expr(condition, params);
                coerce_stmts(body, params);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(s) = init {
                    coerce_stmts(std::slice::from_mut(s.as_mut()), params);
                }
                if let Some(c) = condition {
                    coerce_expr(c, params);
                }
                if let Some(s) = step {
                    coerce_stmts(std::slice::from_mut(s.as_mut()), params);
                }
                coerce_stmts(body, params);
            }
            Stmt::Return(Some(e)) => coerce_expr(e, params),
            Stmt::Expr(e) => coerce_expr(e, params),
            Stmt::Block(body) => coerce_stmts(body, params),
        }
    }
}

fn coerce_expr(expr: &mut Expr, params: &HashSet<String>) {
    match expr {
        Expr::Binary { op, left, right }
            if matches!(
                op,
                crate::ast::BinaryOp::Add | crate::ast::BinaryOp::Sub
            ) =>
        {
            coerce_operand(left, params);
            coerce_operand(right, params);
        }
        Expr::Binary { left, right, .. } => {
            coerce_expr(left, params);
            coerce_expr(right, params);
        }
        Expr::Unary { expr, .. } | Expr::CoerceNumber(expr) => coerce_expr(expr, params),
        Expr::Member { object, .. } => coerce_expr(object, params),
        Expr::Index { object, index } => {
            coerce_expr(object, params);
            coerce_expr(index, params);
        }
        Expr::Call { callee, args } => {
            coerce_expr(callee, params);
            for a in args {
                coerce_expr(a, params);
            }
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            coerce_expr(condition, params);
            coerce_expr(then_expr, params);
            coerce_expr(else_expr, params);
        }
        Expr::Literal(Literal::Array(elems)) => {
            for e in elems {
                coerce_expr(e, params);
            }
        }
        Expr::Literal(_) | Expr::Var(_) => {}
    }
}

fn coerce_operand(operand: &mut Box<Expr>, params: &HashSet<String>) {
    match operand.as_mut() {
        Expr::Var(name) if params.contains(name) => {
            let inner = std::mem::replace(operand.as_mut(), Expr::number(0.0));
            *operand.as_mut() = Expr::CoerceNumber(Box::new(inner));
        }
        other => coerce_expr(other, params),
    }
}

fn strip_instructional_stubs(program: &mut Program, entry_name: &str) {
    program.items.retain(|item| {
        let Item::Function(decl) = item else {
            return true;
        };
        if decl.name == entry_name || !interceptor::is_primitive(&decl.name) {
            return true;
        }
        !is_stub_body(&decl.body)
    });
}

fn is_stub_body(body: &[Stmt]) -> bool {
    match body {
        [] => true,
        [Stmt::Return(None)] => true,
        [Stmt::Return(Some(Expr::Literal(_)))] => true,
        _ => false,
    }
}

fn reorder_entry_call_sites(program: &mut Program, entry: &EntryPoint) {
    for item in &mut program.items {
        match item {
            Item::Function(decl) => reorder_in_stmts(&mut decl.body, entry),
            Item::Stmt(stmt) => reorder_in_stmts(std::slice::from_mut(stmt), entry),
        }
    }
}

fn reorder_in_stmts(stmts: &mut [Stmt], entry: &EntryPoint) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { init: Some(e), .. } => reorder_in_expr(e, entry),
            Stmt::Let { init: None, .. } | Stmt::Break | Stmt::Continue | Stmt::Return(None) => {}
            Stmt::Assign { target, value } => {
                for idx in &mut target.indices {
                    reorder_in_expr(idx, entry);
                }
                reorder_in_expr(value, entry);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                reorder_in_expr(condition, entry);
                reorder_in_stmts(then_branch, entry);
                if let Some(eb) = else_branch {
                    reorder_in_stmts(eb, entry);
                }
            }
            Stmt::While { condition, body } => {
                reorder_in_expr(condition, entry);
                reorder_in_stmts(body, entry);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(s) = init {
                    reorder_in_stmts(std::slice::from_mut(s.as_mut()), entry);
                }
                if let Some(c) = condition {
                    reorder_in_expr(c, entry);
                }
                if let Some(s) = step {
                    reorder_in_stmts(std::slice::from_mut(s.as_mut()), entry);
                }
                reorder_in_stmts(body, entry);
            }
            Stmt::Return(Some(e)) => reorder_in_expr(e, entry),
            Stmt::Expr(e) => reorder_in_expr(e, entry),
            Stmt::Block(body) => reorder_in_stmts(body, entry),
        }
    }
}

fn reorder_in_expr(expr: &mut Expr, entry: &EntryPoint) {
    match expr {
        Expr::Call { callee, args } => {
            for a in args.iter_mut() {
                reorder_in_expr(a, entry);
            }
            reorder_in_expr(callee, entry);
            if let Expr::Var(name) = callee.as_ref() {
                if name == &entry.name {
                    realign_args(args, &entry.params);
                }
            }
        }
        Expr::Binary { left, right, .. } => {
            reorder_in_expr(left, entry);
            reorder_in_expr(right, entry);
        }
        Expr::Unary { expr, .. } | Expr::CoerceNumber(expr) => reorder_in_expr(expr, entry),
        Expr::Member { object, .. } => reorder_in_expr(object, entry),
        Expr::Index { object, index } => {
            reorder_in_expr(object, entry);
            reorder_in_expr(index, entry);
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            reorder_in_expr(condition, entry);
            reorder_in_expr(then_expr, entry);
            reorder_in_expr(else_expr, entry);
        }
        Expr::Literal(Literal::Array(elems)) => {
            for e in elems {
                reorder_in_expr(e, entry);
            }
        }
        Expr::Literal(_) | Expr::Var(_) => {}
    }
}

fn realign_args(args: &mut [Expr], params: &[String]) {
    if args.len() != params.len() {
        return;
    }
    let names: Vec<&str> = args
        .iter()
        .filter_map(|a| match a {
            Expr::Var(n) => Some(n.as_str()),
            _ => None,
        })
        .collect();
    if names.len() != args.len() {
        return;
    }
    let arg_set: HashSet<&str> = names.iter().copied().collect();
    let param_set: HashSet<&str> = params.iter().map(String::as_str).collect();
    if arg_set != param_set || arg_set.len() != args.len() {
        return;
    }
    for (i, param) in params.iter().enumerate() {
        args[i] = Expr::var(param.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::AlgorithmDetector;
    use crate::level::ProfileFlags;
    use crate::parser::parse_program;

    fn detect_and_instrument(source: &str) -> Program {
        let program = parse_program(source).unwrap();
        let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
        InstrumentationRewriter::instrument(program, &detected)
    }

    const SUBSET_SUM_SRC: &str = r"
        function subsetSum(arr, index, sum, target_sum) {
            if (sum == target_sum) { return true; }
            if (index >= arr.length) { return false; }
            return subsetSum(arr, index + 1, sum + arr[index], target_sum);
        }
    ";

    #[test]
    fn test_wrapper_inserted_before_impl() {
        let rewritten = detect_and_instrument(SUBSET_SUM_SRC);
        let names: Vec<&str> = rewritten.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["subsetSum", "__impl_subsetSum"]);
    }

    #[test]
    fn test_wrapper_delegates_and_hooks() {
        let rewritten = detect_and_instrument(SUBSET_SUM_SRC);
        let wrapper = rewritten.find_function("subsetSum").unwrap();
        assert_eq!(wrapper.params, vec!["arr", "index", "sum", "target_sum"]);
        let calls = wrapper.called_names();
        assert!(calls.contains("__impl_subsetSum"));
        assert!(calls.contains(hooks::CELL_UPDATE));
        assert!(calls.contains(hooks::CALL_RETURN));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let program = parse_program(SUBSET_SUM_SRC).unwrap();
        let detected = AlgorithmDetector::detect(&program, &ProfileFlags::default());
        let once = InstrumentationRewriter::instrument(program, &detected);
        let redetected = AlgorithmDetector::detect(&once, &ProfileFlags::default());
        assert!(redetected.already_instrumented);
        let twice = InstrumentationRewriter::instrument(once.clone(), &redetected);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_signature_missing_skips_silently() {
        let program = parse_program("var x = 1;").unwrap();
        let flags = ProfileFlags {
            knapsack: true,
            ..ProfileFlags::default()
        };
        let detected = AlgorithmDetector::detect(&program, &flags);
        let rewritten = InstrumentationRewriter::instrument(program.clone(), &detected);
        assert_eq!(program, rewritten);
    }

    #[test]
    fn test_primitive_stub_is_stripped() {
        let rewritten = detect_and_instrument(
            r"
            function safe(row, col) { return true; }
            function solve(row) {
                if (safe(row, 0)) { place(row, 0); }
                return false;
            }
            ",
        );
        assert!(!rewritten.has_function("safe"));
        assert!(rewritten.has_function("solve"));
    }

    #[test]
    fn test_scrambled_bare_variable_call_realigned() {
        let rewritten = detect_and_instrument(
            r"
            function subsetSum(arr, index, sum, target_sum) {
                return sum == target_sum;
            }
            var result = subsetSum(target_sum, arr, index, sum);
            ",
        );
        let Item::Stmt(Stmt::Let {
            init: Some(Expr::Call { args, .. }),
            ..
        }) = &rewritten.items[2]
        else {
            panic!("expected top-level call");
        };
        let names: Vec<_> = args
            .iter()
            .map(|a| match a {
                Expr::Var(n) => n.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(names, vec!["arr", "index", "sum", "target_sum"]);
    }
}
