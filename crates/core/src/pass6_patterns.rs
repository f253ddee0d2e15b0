//! Pass 6: pattern warnings.
//!
//! Non-fatal findings: `W0001` for an unbounded `loop`, `W0002` for an
//! agent declaring both composition patterns. Warnings never change the
//! pass/fail outcome unless strict mode is requested, and they render
//! with a warning severity label.

use crate::ast;
use crate::diag::{Code, Diagnostic};

pub fn run(units: &[ast::Unit], diags: &mut Vec<Diagnostic>) {
    for unit in units {
        for decl in &unit.decls {
            match decl {
                ast::Decl::Agent(agent) => {
                    if !agent.delegates.is_empty() && !agent.uses.is_empty() {
                        diags.push(
                            Diagnostic::new(
                                Code::W0002,
                                agent.name_span,
                                format!(
                                    "agent '{}' declares both 'delegate' and 'use'",
                                    agent.name
                                ),
                            )
                            .with_help(
                                "an agent usually hands off entirely (delegate) or invokes \
                                 capabilities (use), not both",
                            ),
                        );
                    }
                }
                ast::Decl::Flow(flow) => warn_unbounded_loops(&flow.body, diags),
                _ => {}
            }
        }
    }
}

fn warn_unbounded_loops(stmts: &[ast::Stmt], diags: &mut Vec<Diagnostic>) {
    for stmt in stmts {
        match stmt {
            ast::Stmt::Loop { max, body, span } => {
                if max.is_none() {
                    diags.push(
                        Diagnostic::new(Code::W0001, *span, "unbounded loop")
                            .with_help("bound the iteration count with 'loop max N do'"),
                    );
                }
                warn_unbounded_loops(body, diags);
            }
            ast::Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                warn_unbounded_loops(then_body, diags);
                warn_unbounded_loops(else_body, diags);
            }
            ast::Stmt::Match { arms, default, .. } => {
                for arm in arms {
                    warn_unbounded_loops(&arm.body, diags);
                }
                if let Some(body) = default {
                    warn_unbounded_loops(body, diags);
                }
            }
            ast::Stmt::Parallel { body, .. } => warn_unbounded_loops(body, diags),
            _ => {}
        }
    }
}
