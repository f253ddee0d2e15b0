//! Symbol table: one flat declaration namespace per compilation.
//!
//! The surface language has a single shared namespace across
//! declaration kinds -- redefining a name as a different kind is still
//! a duplicate. Each symbol carries the index of its declaration within
//! its kind's table; the code generator reuses those indices, so a
//! resolved reference is already a table handle and the artifact never
//! looks anything up by name.

use crate::diag::Span;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKind {
    Model,
    Tool,
    Schema,
    Prompt,
    Agent,
    Policy,
    Flow,
}

impl DeclKind {
    pub fn describe(self) -> &'static str {
        match self {
            DeclKind::Model => "model",
            DeclKind::Tool => "tool",
            DeclKind::Schema => "schema",
            DeclKind::Prompt => "prompt",
            DeclKind::Agent => "agent",
            DeclKind::Policy => "policy",
            DeclKind::Flow => "flow",
        }
    }
}

/// A resolved declaration handle: kind plus index into that kind's
/// table, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub kind: DeclKind,
    pub index: u32,
    /// Span of the declared name, for duplicate/secondary reporting.
    pub span: Span,
}

#[derive(Default)]
pub struct SymbolTable {
    map: HashMap<String, Symbol>,
    counts: HashMap<DeclKind, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Insert a declaration. On a duplicate the first symbol wins and
    /// is returned as `Err` so the caller can report `E0003`; the later
    /// declaration gets no index and is excluded from resolution.
    pub fn insert(&mut self, name: &str, kind: DeclKind, span: Span) -> Result<Symbol, Symbol> {
        if let Some(&first) = self.map.get(name) {
            return Err(first);
        }
        let counter = self.counts.entry(kind).or_insert(0);
        let symbol = Symbol {
            kind,
            index: *counter,
            span,
        };
        *counter += 1;
        self.map.insert(name.to_owned(), symbol);
        Ok(symbol)
    }

    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    /// Is this declaration the canonical (first-wins) one for its name?
    pub fn is_canonical(&self, name: &str, name_span: Span) -> bool {
        self.map.get(name).is_some_and(|s| s.span == name_span)
    }

    pub fn count_of(&self, kind: DeclKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0) as usize
    }

    /// Sorted names of one kind, for "defined models are: ..." help.
    pub fn names_of(&self, kind: DeclKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .map
            .iter()
            .filter(|(_, s)| s.kind == kind)
            .map(|(n, _)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    fn span(line: u32) -> Span {
        Span::new(FileId(0), line, 1, 1)
    }

    #[test]
    fn first_declaration_wins() {
        let mut table = SymbolTable::new();
        let first = table.insert("main", DeclKind::Model, span(1)).unwrap();
        let err = table.insert("main", DeclKind::Model, span(5)).unwrap_err();
        assert_eq!(err, first);
        assert_eq!(table.get("main").unwrap().span, span(1));
        assert_eq!(table.count_of(DeclKind::Model), 1);
    }

    #[test]
    fn namespace_is_flat_across_kinds() {
        let mut table = SymbolTable::new();
        table.insert("x", DeclKind::Model, span(1)).unwrap();
        assert!(table.insert("x", DeclKind::Tool, span(2)).is_err());
    }

    #[test]
    fn indices_are_per_kind_and_dense() {
        let mut table = SymbolTable::new();
        let m0 = table.insert("m0", DeclKind::Model, span(1)).unwrap();
        let t0 = table.insert("t0", DeclKind::Tool, span(2)).unwrap();
        let m1 = table.insert("m1", DeclKind::Model, span(3)).unwrap();
        assert_eq!((m0.index, t0.index, m1.index), (0, 0, 1));
    }

    #[test]
    fn names_of_is_sorted() {
        let mut table = SymbolTable::new();
        table.insert("zeta", DeclKind::Model, span(1)).unwrap();
        table.insert("alpha", DeclKind::Model, span(2)).unwrap();
        table.insert("tool1", DeclKind::Tool, span(3)).unwrap();
        assert_eq!(table.names_of(DeclKind::Model), vec!["alpha", "zeta"]);
    }
}
