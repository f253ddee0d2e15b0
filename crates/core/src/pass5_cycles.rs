//! Pass 5: cycle detection.
//!
//! Two directed graphs are searched with a depth-first walk that keeps
//! a recursion stack: agent -> agent edges from `delegate`/`use`
//! (`E0011`, naming the full cycle path) and file -> file edges from
//! imports (`E0006`). Each back edge is reported exactly once, at the
//! reference that closes the cycle.

use std::collections::HashMap;

use crate::ast;
use crate::diag::{Code, Diagnostic, Span};
use crate::loader::ImportEdge;
use crate::source::SourceSet;
use crate::symbols::{DeclKind, Symbol, SymbolTable};

pub fn run(
    units: &[ast::Unit],
    symbols: &SymbolTable,
    resolved: &HashMap<ast::RefId, Symbol>,
    import_edges: &[ImportEdge],
    sources: &SourceSet,
    diags: &mut Vec<Diagnostic>,
) {
    check_agent_cycles(units, symbols, resolved, diags);
    check_import_cycles(import_edges, sources, diags);
}

fn check_agent_cycles(
    units: &[ast::Unit],
    symbols: &SymbolTable,
    resolved: &HashMap<ast::RefId, Symbol>,
    diags: &mut Vec<Diagnostic>,
) {
    // Canonical agents in table order; indices match Symbol::index.
    let mut agents: Vec<&ast::AgentDecl> = Vec::new();
    for unit in units {
        for decl in &unit.decls {
            if let ast::Decl::Agent(a) = decl {
                if symbols.is_canonical(&a.name, a.name_span) {
                    agents.push(a);
                }
            }
        }
    }

    let mut adj: Vec<Vec<(usize, Span)>> = vec![Vec::new(); agents.len()];
    for (i, agent) in agents.iter().enumerate() {
        for site in agent.delegates.iter().chain(agent.uses.iter()) {
            if let Some(symbol) = resolved.get(&site.id) {
                if symbol.kind == DeclKind::Agent {
                    adj[i].push((symbol.index as usize, site.span));
                }
            }
        }
    }

    let names: Vec<&str> = agents.iter().map(|a| a.name.as_str()).collect();
    let mut search = CycleSearch::new(adj.len());
    for v in 0..adj.len() {
        if search.state[v] == State::New {
            search.dfs(v, &adj, &mut |path, closing, span| {
                let mut cycle: Vec<&str> = path.iter().map(|&i| names[i]).collect();
                cycle.push(names[closing]);
                diags.push(Diagnostic::new(
                    Code::E0011,
                    span,
                    format!("circular agent reference: {}", cycle.join(" -> ")),
                ));
            });
        }
    }
}

fn check_import_cycles(edges: &[ImportEdge], sources: &SourceSet, diags: &mut Vec<Diagnostic>) {
    if edges.is_empty() {
        return;
    }
    let node_count = edges
        .iter()
        .flat_map(|e| [e.from.0, e.to.0])
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);
    let mut adj: Vec<Vec<(usize, Span)>> = vec![Vec::new(); node_count];
    for edge in edges {
        adj[edge.from.0 as usize].push((edge.to.0 as usize, edge.span));
    }

    let mut search = CycleSearch::new(node_count);
    for v in 0..node_count {
        if search.state[v] == State::New {
            search.dfs(v, &adj, &mut |path, closing, span| {
                let mut cycle: Vec<&str> = path
                    .iter()
                    .map(|&i| sources.name(crate::source::FileId(i as u32)))
                    .collect();
                cycle.push(sources.name(crate::source::FileId(closing as u32)));
                diags.push(Diagnostic::new(
                    Code::E0006,
                    span,
                    format!("circular import: {}", cycle.join(" -> ")),
                ));
            });
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    New,
    Active,
    Done,
}

struct CycleSearch {
    state: Vec<State>,
    path: Vec<usize>,
}

impl CycleSearch {
    fn new(n: usize) -> Self {
        CycleSearch {
            state: vec![State::New; n],
            path: Vec::new(),
        }
    }

    /// Depth-first walk. `report(path_from_cycle_start, closing, span)`
    /// fires once per back edge.
    fn dfs(
        &mut self,
        v: usize,
        adj: &[Vec<(usize, Span)>],
        report: &mut impl FnMut(&[usize], usize, Span),
    ) {
        self.state[v] = State::Active;
        self.path.push(v);
        for &(to, span) in &adj[v] {
            match self.state[to] {
                State::Active => {
                    let start = self
                        .path
                        .iter()
                        .position(|&n| n == to)
                        .unwrap_or(0);
                    report(&self.path[start..], to, span);
                }
                State::New => self.dfs(to, adj, report),
                State::Done => {}
            }
        }
        self.path.pop();
        self.state[v] = State::Done;
    }
}
