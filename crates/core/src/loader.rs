//! Import loading: lex, parse and build every file reachable from the
//! root through `import` statements.
//!
//! File reads happen only here, through a [`SourceProvider`], and
//! return snapshot text -- the analyzer and generator never perform
//! I/O. Missing imports are reported as `E0005` into the shared
//! diagnostic list. Import *cycles* are not reported here: the loader
//! records the file graph edges and simply declines to re-enter a file
//! already on its stack; pass 5 runs the cycle search over the edges.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast;
use crate::build::{self, RefIds};
use crate::diag::{Code, Diagnostic, Span};
use crate::lexer;
use crate::parser;
use crate::source::{FileId, SourceProvider, SourceSet};

/// An edge in the file import graph: `from` imports `to`, at `span`.
#[derive(Debug, Clone, Copy)]
pub struct ImportEdge {
    pub from: FileId,
    pub to: FileId,
    pub span: Span,
}

/// Everything the loading boundary produces for one compilation.
pub struct LoadedProgram {
    /// Built units, imported files first, the root file last.
    pub units: Vec<ast::Unit>,
    pub import_edges: Vec<ImportEdge>,
    pub diagnostics: Vec<Diagnostic>,
    /// True when any file's parse aborted; no reliable AST exists, so
    /// semantic analysis is skipped.
    pub parse_failed: bool,
}

/// Load a program whose root text is already in hand (the
/// single-source entry points and tests).
pub fn load_source(
    root_name: &str,
    root_text: &str,
    provider: &dyn SourceProvider,
    sources: &mut SourceSet,
) -> LoadedProgram {
    let mut loader = Loader {
        provider,
        refs: RefIds::new(),
        visited: HashMap::new(),
        stack: Vec::new(),
        units: Vec::new(),
        import_edges: Vec::new(),
        diagnostics: Vec::new(),
        parse_failed: false,
    };
    let root_path = PathBuf::from(root_name);
    let file = sources.add(root_name, root_text);
    loader.visited.insert(root_path.clone(), file);
    loader.load_file(file, &root_path, sources);
    LoadedProgram {
        units: loader.units,
        import_edges: loader.import_edges,
        diagnostics: loader.diagnostics,
        parse_failed: loader.parse_failed,
    }
}

/// Load a program from a root path via the given provider. `Err` means
/// the root itself could not be read -- the I/O-failure case the CLI
/// maps to exit code 2.
pub fn load_path(
    root: &Path,
    provider: &dyn SourceProvider,
    sources: &mut SourceSet,
) -> Result<LoadedProgram, std::io::Error> {
    let text = provider.read_source(root)?;
    Ok(load_source(&root.to_string_lossy(), &text, provider, sources))
}

struct Loader<'a> {
    provider: &'a dyn SourceProvider,
    refs: RefIds,
    /// Path -> file id for every file ever entered.
    visited: HashMap<PathBuf, FileId>,
    /// Files currently being loaded (recursion stack).
    stack: Vec<FileId>,
    units: Vec<ast::Unit>,
    import_edges: Vec<ImportEdge>,
    diagnostics: Vec<Diagnostic>,
    parse_failed: bool,
}

impl<'a> Loader<'a> {
    fn load_file(&mut self, file: FileId, path: &Path, sources: &mut SourceSet) {
        let text = sources.text(file).to_owned();
        let (tokens, mut lex_diags) = lexer::tokenize(&text, file);
        self.diagnostics.append(&mut lex_diags);

        let cst = match parser::parse(&tokens) {
            Ok(cst) => cst,
            Err(diag) => {
                self.diagnostics.push(diag);
                self.parse_failed = true;
                return;
            }
        };
        let unit = build::build(&cst, file, &mut self.refs);

        self.stack.push(file);
        let base = path.parent().unwrap_or(Path::new("")).to_owned();
        for decl in &unit.decls {
            if let ast::Decl::Import(import) = decl {
                self.load_import(file, &base, import, sources);
            }
        }
        self.stack.pop();

        // Imported units land before the importer, so declaration
        // tables keep a stable dependency-first order.
        self.units.push(unit);
    }

    fn load_import(
        &mut self,
        from: FileId,
        base: &Path,
        import: &ast::ImportDecl,
        sources: &mut SourceSet,
    ) {
        let resolved = self.provider.resolve_import(base, &import.path);

        if let Some(&existing) = self.visited.get(&resolved) {
            // Already loaded, or currently loading (a cycle). Either
            // way, only the edge is recorded; pass 5 reports cycles.
            self.import_edges.push(ImportEdge {
                from,
                to: existing,
                span: import.span,
            });
            return;
        }

        let text = match self.provider.read_source(&resolved) {
            Ok(text) => text,
            Err(_) => {
                self.diagnostics.push(Diagnostic::new(
                    Code::E0005,
                    import.span,
                    format!("import '{}' not found", import.path),
                ));
                return;
            }
        };

        let to = sources.add(resolved.to_string_lossy(), text);
        self.visited.insert(resolved.clone(), to);
        self.import_edges.push(ImportEdge {
            from,
            to,
            span: import.span,
        });
        self.load_file(to, &resolved, sources);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{EmptyProvider, InMemoryProvider};

    #[test]
    fn single_source_import_is_e0005() {
        let mut sources = SourceSet::new();
        let program = load_source(
            "main.weave",
            "import \"lib.weave\"\nmodel m = \"x\"\n",
            &EmptyProvider,
            &mut sources,
        );
        assert_eq!(program.diagnostics.len(), 1);
        assert_eq!(program.diagnostics[0].code, Code::E0005);
        assert_eq!(program.units.len(), 1);
    }

    #[test]
    fn imports_load_dependency_first() {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("lib.weave"),
            "model shared = \"gpt-4.1\"\n".to_string(),
        );
        let provider = InMemoryProvider::new(files);
        let mut sources = SourceSet::new();
        let program = load_source(
            "main.weave",
            "import \"lib.weave\"\nprompt p\n    using model shared\n    \"\"\"x\"\"\"\n",
            &provider,
            &mut sources,
        );
        assert!(program.diagnostics.is_empty());
        assert_eq!(program.units.len(), 2);
        // lib.weave's unit comes first.
        assert_eq!(sources.name(program.units[0].file), "lib.weave");
        assert_eq!(program.import_edges.len(), 1);
    }

    #[test]
    fn import_cycle_records_edge_without_recursing() {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("a.weave"),
            "import \"b.weave\"\n".to_string(),
        );
        files.insert(
            PathBuf::from("b.weave"),
            "import \"a.weave\"\n".to_string(),
        );
        let provider = InMemoryProvider::new(files);
        let mut sources = SourceSet::new();
        let text = provider.read_source(Path::new("a.weave")).unwrap();
        let program = load_source("a.weave", &text, &provider, &mut sources);
        // Both files loaded exactly once, both edges present.
        assert_eq!(program.units.len(), 2);
        assert_eq!(program.import_edges.len(), 2);
        assert!(program.diagnostics.is_empty());
    }
}
