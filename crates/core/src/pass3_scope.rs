//! Pass 3: variable-scope checking.
//!
//! Flows have a single flat execution-order scope: an assignment
//! anywhere in a flow makes the name visible everywhere after that
//! point, including inside and after nested blocks -- there are no
//! nested lexical scopes. Reading a name before it is bound is `E0002`.
//!
//! The destination of `$x = run agent a on escalate return $x` is
//! considered bound inside that statement's own escalation handler: the
//! handler runs after the result is captured.

use std::collections::HashSet;

use crate::ast;
use crate::cst::Expr;
use crate::diag::{Code, Diagnostic};

pub fn run(units: &[ast::Unit], diags: &mut Vec<Diagnostic>) {
    for unit in units {
        for decl in &unit.decls {
            if let ast::Decl::Flow(flow) = decl {
                let mut scope = Scope {
                    bound: HashSet::new(),
                    diags,
                };
                scope.walk_stmts(&flow.body);
            }
        }
    }
}

struct Scope<'a> {
    bound: HashSet<String>,
    diags: &'a mut Vec<Diagnostic>,
}

impl<'a> Scope<'a> {
    fn walk_stmts(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Assign { var, rhs, .. } => {
                match rhs {
                    ast::Rhs::Expr(expr) => {
                        self.check_expr(expr);
                        self.bound.insert(var.clone());
                    }
                    ast::Rhs::Run(run) => {
                        self.check_opt(&run.input);
                        // The result is captured before the escalation
                        // handler can fire.
                        self.bound.insert(var.clone());
                        self.check_handler(&run.escalation);
                    }
                }
            }
            ast::Stmt::Run(run) => {
                self.check_opt(&run.input);
                self.check_handler(&run.escalation);
            }
            ast::Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.check_expr(cond);
                self.walk_stmts(then_body);
                self.walk_stmts(else_body);
            }
            ast::Stmt::Match { subject, arms, default, .. } => {
                self.check_expr(subject);
                for arm in arms {
                    self.walk_stmts(&arm.body);
                }
                if let Some(body) = default {
                    self.walk_stmts(body);
                }
            }
            ast::Stmt::Loop { body, .. } | ast::Stmt::Parallel { body, .. } => {
                self.walk_stmts(body)
            }
            ast::Stmt::Return { value, .. } => self.check_opt(value),
        }
    }

    fn check_handler(&mut self, handler: &Option<ast::EscalationHandler>) {
        if let Some(h) = handler {
            if let ast::EscalationAction::Return(Some(expr)) = &h.action {
                self.check_expr(expr);
            }
        }
    }

    fn check_opt(&mut self, expr: &Option<Expr>) {
        if let Some(e) = expr {
            self.check_expr(e);
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(_) => {}
            Expr::Var { name, span } => {
                if !self.bound.contains(name) {
                    self.diags.push(Diagnostic::new(
                        Code::E0002,
                        *span,
                        format!("variable '${}' used before assignment", name),
                    ));
                }
            }
            Expr::Unary { expr, .. } => self.check_expr(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
            }
            Expr::Field { base, .. } => self.check_expr(base),
            Expr::Index { base, index, .. } => {
                self.check_expr(base);
                self.check_expr(index);
            }
        }
    }
}
