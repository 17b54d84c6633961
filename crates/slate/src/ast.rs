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
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    Member {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    CoerceNumber(Box<Expr>),
}

impl Expr {
    pub fn number(n: f64) -> Self {
        Expr::Literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(s.into()))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(Expr::Var(name.into())),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignTarget {
    pub name: String,
    pub indices: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: AssignTarget,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Function(FunctionDecl),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            Item::Stmt(_) => None,
        })
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions().find(|f| f.name == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.find_function(name).is_some()
    }

    pub fn identifiers(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for item in &self.items {
            match item {
                Item::Function(f) => {
                    out.insert(f.name.clone());
                    out.extend(f.params.iter().cloned());
                    collect_stmt_idents(&f.body, &mut out);
                }
                Item::Stmt(s) => collect_stmt_idents(std::slice::from_ref(s), &mut out),
            }
        }
        out
    }
}

impl FunctionDecl {
    pub fn body_identifiers(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        out.extend(self.params.iter().cloned());
        collect_stmt_idents(&self.body, &mut out);
        out
    }

    pub fn called_names(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        collect_stmt_calls(&self.body, &mut out);
        out
    }
}

fn collect_stmt_idents(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { name, init } => {
                out.insert(name.clone());
                if let Some(e) = init {
                    collect_expr_idents(e, out);
                }
            }
            Stmt::Assign { target, value } => {
                out.insert(target.name.clone());
                for idx in &target.indices {
                    collect_expr_idents(idx, out);
                }
                collect_expr_idents(value, out);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                collect_expr_idents(condition, out);
                collect_stmt_idents(then_branch, out);
                if let Some(eb) = else_branch {
                    collect_stmt_idents(eb, out);
                }
            }
            Stmt::While { condition, body } => {
                collect_expr_idents(condition, out);
                collect_stmt_idents(body, out);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(s) = init {
                    collect_stmt_idents(std::slice::from_ref(s.as_ref()), out);
                }
                if let Some(c) = condition {
                    collect_expr_idents(c, out);
                }
                if let Some(s) = step {
                    collect_stmt_idents(std::slice::from_ref(s.as_ref()), out);
                }
                collect_stmt_idents(body, out);
            }
            Stmt::Return(Some(e)) => collect_expr_idents(e, out),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
            Stmt::Expr(e) => collect_expr_idents(e, out),
            Stmt::Block(body) => collect_stmt_idents(body, out),
        }
    }
}

fn collect_expr_idents(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Literal(Literal::Array(elems)) => {
            for e in elems {
                collect_expr_idents(e, out);
            }
        }
        Expr::Literal(_) => {}
        Expr::Var(name) => {
            out.insert(name.clone());
        }
        Expr::Member { object, .. } => collect_expr_idents(object, out),
        Expr::Index { object, index } => {
            collect_expr_idents(object, out);
            collect_expr_idents(index, out);
        }
        Expr::Unary { expr, .. } | Expr::CoerceNumber(expr) => collect_expr_idents(expr, out),
        Expr::Binary { left, right, .. } => {
            collect_expr_idents(left, out);
            collect_expr_idents(right, out);
        }
        Expr::Call { callee, args } => {
            collect_expr_idents(callee, out);
            for a in args {
                collect_expr_idents(a, out);
            }
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            collect_expr_idents(condition, out);
            collect_expr_idents(then_expr, out);
            collect_expr_idents(else_expr, out);
        }
    }
}

fn collect_stmt_calls(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { init: Some(e), .. } => collect_expr_calls(e, out),
            Stmt::Let { init: None, .. } => {}
            Stmt::Assign { target, value } => {
                for idx in &target.indices {
                    collect_expr_calls(idx, out);
                }
                collect_expr_calls(value, out);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                collect_expr_calls(condition, out);
                collect_stmt_calls(then_branch, out);
                if let Some(eb) = else_branch {
                    collect_stmt_calls(eb, out);
                }
            }
            Stmt::While { condition, body } => {
                collect_expr_calls(condition, out);
                collect_stmt_calls(body, out);
            }
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(s) = init {
                    collect_stmt_calls(std::slice::from_ref(s.as_ref()), out);
                }
                if let Some(c) = condition {
                    collect_expr_calls(c, out);
                }
                if let Some(s) = step {
                    collect_stmt_calls(std::slice::from_ref(s.as_ref()), out);
                }
                collect_stmt_calls(body, out);
            }
            Stmt::Return(Some(e)) => collect_expr_calls(e, out),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
            Stmt::Expr(e) => collect_expr_calls(e, out),
            Stmt::Block(body) => collect_stmt_calls(body, out),
        }
    }
}

fn collect_expr_calls(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Call { callee, args } => {
            if let Expr::Var(name) = callee.as_ref() {
                out.insert(name.clone());
            }
            collect_expr_calls(callee, out);
            for a in args {
                collect_expr_calls(a, out);
            }
        }
        Expr::Literal(Literal::Array(elems)) => {
            for e in elems {
                collect_expr_calls(e, out);
            }
        }
        Expr::Literal(_) | Expr::Var(_) => {}
        Expr::Member { object, .. } => collect_expr_calls(object, out),
        Expr::Index { object, index } => {
            collect_expr_calls(object, out);
            collect_expr_calls(index, out);
        }
        Expr::Unary { expr, .. } | Expr::CoerceNumber(expr) => collect_expr_calls(expr, out),
        Expr::Binary { left, right, .. } => {
            collect_expr_calls(left, out);
            collect_expr_calls(right, out);
        }
        Expr::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            collect_expr_calls(condition, out);
            collect_expr_calls(then_expr, out);
            collect_expr_calls(else_expr, out);
        }
    }
}
