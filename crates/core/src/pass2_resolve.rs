//! Pass 2: reference resolution.
//!
//! Looks up every name reference (prompt model overrides, expected
//! schemas, agent instruction/tool/composition/policy references,
//! schema field types, flow run targets) and records the resolved
//! handle in a side table keyed by [`ast::RefId`]. Unresolved or
//! wrong-kind references are `E0001`, with a help line listing the
//! defined names of the expected kind.

use std::collections::HashMap;

use crate::ast;
use crate::diag::{Code, Diagnostic};
use crate::symbols::{DeclKind, Symbol, SymbolTable};

pub fn run(
    units: &[ast::Unit],
    symbols: &SymbolTable,
    diags: &mut Vec<Diagnostic>,
) -> HashMap<ast::RefId, Symbol> {
    let mut resolver = Resolver {
        symbols,
        resolved: HashMap::new(),
        diags,
    };
    for unit in units {
        for decl in &unit.decls {
            match decl {
                ast::Decl::Import(_) | ast::Decl::Model(_) | ast::Decl::Handler(_) => {}
                ast::Decl::Tool(tool) => {
                    for param in &tool.params {
                        resolver.resolve_ty(&param.ty);
                    }
                }
                ast::Decl::Schema(schema) => {
                    for field in &schema.fields {
                        resolver.resolve_ty(&field.ty);
                    }
                }
                ast::Decl::Prompt(prompt) => {
                    if let Some(model) = &prompt.model {
                        resolver.resolve(model, DeclKind::Model);
                    }
                    if let Some(expecting) = &prompt.expecting {
                        resolver.resolve(expecting, DeclKind::Schema);
                    }
                }
                ast::Decl::Agent(agent) => {
                    if let Some(instruction) = &agent.instruction {
                        resolver.resolve(instruction, DeclKind::Prompt);
                    }
                    for tool in &agent.tools {
                        resolver.resolve(tool, DeclKind::Tool);
                    }
                    for delegate in &agent.delegates {
                        resolver.resolve(delegate, DeclKind::Agent);
                    }
                    for used in &agent.uses {
                        resolver.resolve(used, DeclKind::Agent);
                    }
                    if let Some(retry) = &agent.retry {
                        resolver.resolve(retry, DeclKind::Policy);
                    }
                    if let Some(timeout) = &agent.timeout {
                        resolver.resolve(timeout, DeclKind::Policy);
                    }
                }
                ast::Decl::Policy(_) => {}
                ast::Decl::Flow(flow) => resolver.resolve_stmts(&flow.body),
            }
        }
    }
    resolver.resolved
}

struct Resolver<'a> {
    symbols: &'a SymbolTable,
    resolved: HashMap<ast::RefId, Symbol>,
    diags: &'a mut Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, site: &ast::NameRef, expected: DeclKind) {
        match self.symbols.get(&site.name) {
            Some(symbol) if symbol.kind == expected => {
                self.resolved.insert(site.id, symbol);
            }
            Some(symbol) => {
                self.diags.push(
                    Diagnostic::new(
                        Code::E0001,
                        site.span,
                        format!(
                            "'{}' is a {}, but a {} is required here",
                            site.name,
                            symbol.kind.describe(),
                            expected.describe()
                        ),
                    )
                    .with_help(self.help_for(expected)),
                );
            }
            None => {
                self.diags.push(
                    Diagnostic::new(
                        Code::E0001,
                        site.span,
                        format!("unknown {} '{}'", expected.describe(), site.name),
                    )
                    .with_help(self.help_for(expected)),
                );
            }
        }
    }

    fn help_for(&self, kind: DeclKind) -> String {
        let names = self.symbols.names_of(kind);
        if names.is_empty() {
            format!("no {}s are defined", kind.describe())
        } else {
            format!("defined {}s are: {}", kind.describe(), names.join(", "))
        }
    }

    fn resolve_ty(&mut self, ty: &ast::FieldTy) {
        match ty {
            ast::FieldTy::Text | ast::FieldTy::Number | ast::FieldTy::Bool => {}
            ast::FieldTy::List(inner) => self.resolve_ty(inner),
            ast::FieldTy::Schema(site) => self.resolve(site, DeclKind::Schema),
        }
    }

    fn resolve_stmts(&mut self, stmts: &[ast::Stmt]) {
        for stmt in stmts {
            match stmt {
                ast::Stmt::Assign { rhs, .. } => {
                    if let ast::Rhs::Run(run) = rhs {
                        self.resolve_run(run);
                    }
                }
                ast::Stmt::Run(run) => self.resolve_run(run),
                ast::Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.resolve_stmts(then_body);
                    self.resolve_stmts(else_body);
                }
                ast::Stmt::Match { arms, default, .. } => {
                    for arm in arms {
                        self.resolve_stmts(&arm.body);
                    }
                    if let Some(body) = default {
                        self.resolve_stmts(body);
                    }
                }
                ast::Stmt::Loop { body, .. } | ast::Stmt::Parallel { body, .. } => {
                    self.resolve_stmts(body)
                }
                ast::Stmt::Return { .. } => {}
            }
        }
    }

    fn resolve_run(&mut self, run: &ast::RunStmt) {
        let expected = match run.kind {
            crate::cst::RunKind::Agent => DeclKind::Agent,
            crate::cst::RunKind::Flow => DeclKind::Flow,
            crate::cst::RunKind::Llm => DeclKind::Prompt,
        };
        self.resolve(&run.target, expected);
    }
}
