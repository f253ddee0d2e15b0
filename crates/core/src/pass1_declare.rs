//! Pass 1: declaration collection.
//!
//! Inserts every top-level name into the symbol table. A name already
//! present is `E0003`; the later declaration is recorded in the
//! diagnostic but excluded from resolution, so the first declaration
//! stays resolvable.

use crate::ast;
use crate::diag::{Code, Diagnostic};
use crate::symbols::{DeclKind, SymbolTable};

pub fn run(units: &[ast::Unit], diags: &mut Vec<Diagnostic>) -> SymbolTable {
    let mut table = SymbolTable::new();
    for unit in units {
        for decl in &unit.decls {
            let (name, kind, name_span) = match decl {
                ast::Decl::Import(_) | ast::Decl::Handler(_) => continue,
                ast::Decl::Model(d) => (&d.name, DeclKind::Model, d.name_span),
                ast::Decl::Tool(d) => (&d.name, DeclKind::Tool, d.name_span),
                ast::Decl::Schema(d) => (&d.name, DeclKind::Schema, d.name_span),
                ast::Decl::Prompt(d) => (&d.name, DeclKind::Prompt, d.name_span),
                ast::Decl::Agent(d) => (&d.name, DeclKind::Agent, d.name_span),
                ast::Decl::Policy(d) => (&d.name, DeclKind::Policy, d.name_span),
                ast::Decl::Flow(d) => (&d.name, DeclKind::Flow, d.name_span),
            };
            if let Err(first) = table.insert(name, kind, name_span) {
                diags.push(
                    Diagnostic::new(
                        Code::E0003,
                        name_span,
                        format!(
                            "duplicate definition of '{}'; first defined as a {} at line {}",
                            name,
                            first.kind.describe(),
                            first.span.line
                        ),
                    )
                    .with_secondary(first.span),
                );
            }
        }
    }
    table
}
