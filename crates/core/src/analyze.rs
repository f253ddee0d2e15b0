//! Six-pass semantic analyzer: thin orchestrator over the pass modules.
//!
//! Unlike the lexer and parser, the analyzer never stops at the first
//! error: all six passes run to completion and accumulate diagnostics,
//! so a single `check` invocation surfaces every problem. Code
//! generation is gated on the result containing zero error-severity
//! diagnostics.

use std::collections::HashMap;
use std::path::Path;

use crate::ast;
use crate::diag::{self, Diagnostic};
use crate::loader::{self, LoadedProgram};
use crate::source::{EmptyProvider, FileSystemProvider, SourceProvider, SourceSet};
use crate::symbols::{Symbol, SymbolTable};
use crate::{pass1_declare, pass2_resolve, pass3_scope, pass4_require, pass5_cycles, pass6_patterns};

/// Validated program: the immutable AST plus the analyzer's side
/// tables. The AST itself is never mutated by analysis.
pub struct Analysis {
    pub units: Vec<ast::Unit>,
    pub symbols: SymbolTable,
    pub resolved: HashMap<ast::RefId, Symbol>,
    pub diagnostics: Vec<Diagnostic>,
    /// True when parsing aborted and the semantic passes were skipped.
    pub parse_failed: bool,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        diag::has_errors(&self.diagnostics)
    }
}

/// Run the semantic passes over a loaded program.
pub fn analyze(program: LoadedProgram, sources: &SourceSet) -> Analysis {
    let LoadedProgram {
        units,
        import_edges,
        mut diagnostics,
        parse_failed,
    } = program;

    if parse_failed {
        // No reliable AST: report what the front end found and stop.
        diag::sort(&mut diagnostics);
        return Analysis {
            units,
            symbols: SymbolTable::new(),
            resolved: HashMap::new(),
            diagnostics,
            parse_failed,
        };
    }

    let symbols = pass1_declare::run(&units, &mut diagnostics);
    let resolved = pass2_resolve::run(&units, &symbols, &mut diagnostics);
    pass3_scope::run(&units, &mut diagnostics);
    pass4_require::run(&units, &symbols, &resolved, &mut diagnostics);
    pass5_cycles::run(
        &units,
        &symbols,
        &resolved,
        &import_edges,
        sources,
        &mut diagnostics,
    );
    pass6_patterns::run(&units, &mut diagnostics);

    diag::sort(&mut diagnostics);
    Analysis {
        units,
        symbols,
        resolved,
        diagnostics,
        parse_failed,
    }
}

/// Load and analyze a program whose root text is in hand. Imports
/// resolve through `provider`.
pub fn analyze_source(
    root_name: &str,
    root_text: &str,
    provider: &dyn SourceProvider,
) -> (Analysis, SourceSet) {
    let mut sources = SourceSet::new();
    let program = loader::load_source(root_name, root_text, provider, &mut sources);
    let analysis = analyze(program, &sources);
    (analysis, sources)
}

/// Single-source analysis: any `import` reports `E0005`.
pub fn analyze_single(root_name: &str, root_text: &str) -> (Analysis, SourceSet) {
    analyze_source(root_name, root_text, &EmptyProvider)
}

/// Load and analyze from a root path. `Err` is the I/O-failure case
/// (root unreadable) that the CLI maps to exit code 2.
pub fn analyze_path(root: &Path) -> Result<(Analysis, SourceSet), std::io::Error> {
    let mut sources = SourceSet::new();
    let program = loader::load_path(root, &FileSystemProvider, &mut sources)?;
    let analysis = analyze(program, &sources);
    Ok((analysis, sources))
}
