//! weave-core: front end and semantic analyzer for the Weave workflow
//! language.
//!
//! Provides the compilation pipeline from `.weave` source text up to a
//! validated AST: lexing with indentation preprocessing, parsing into a
//! concrete syntax tree, typed AST construction, and the six semantic
//! passes. Code generation lives in the `weave-codegen` crate.
//!
//! # Public API
//!
//! Key entry points are re-exported at the crate root:
//!
//! - [`check()`] / [`check_path()`] -- validate source, return
//!   diagnostics plus summary counts
//! - [`analyze_source()`] / [`analyze_path()`] -- run the front end and
//!   all six passes, returning the validated [`Analysis`]
//! - [`diag::render()`] -- text (code frame) or structured rendering
//!
//! `compile()` itself is in `weave-codegen`, which consumes the
//! [`Analysis`] produced here.
//!
//! Compilation has no shared mutable state: every invocation owns its
//! symbol table, diagnostics and source registry, so callers may
//! compile independent files in parallel without synchronization.

pub mod analyze;
pub mod ast;
pub mod build;
pub mod check;
pub mod cst;
pub mod diag;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod pass1_declare;
pub mod pass2_resolve;
pub mod pass3_scope;
pub mod pass4_require;
pub mod pass5_cycles;
pub mod pass6_patterns;
pub mod source;
pub mod symbols;

// ── Convenience re-exports: key types ────────────────────────────────

pub use analyze::Analysis;
pub use check::{CheckReport, Summary};
pub use diag::{Code, Diagnostic, Format, Severity, Span};
pub use source::{EmptyProvider, FileId, FileSystemProvider, InMemoryProvider, SourceProvider, SourceSet};
pub use symbols::{DeclKind, Symbol, SymbolTable};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use analyze::{analyze, analyze_path, analyze_single, analyze_source};
pub use check::{check, check_path};
