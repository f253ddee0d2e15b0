//! weave-codegen: code generation for the Weave workflow language.
//!
//! Consumes the validated [`Analysis`] produced by `weave-core` and
//! lowers it into an [`Artifact`] (resolved declaration tables plus one
//! lowered routine per flow) with a bidirectional [`SourceMap`].
//!
//! # Public API
//!
//! - [`compile()`] / [`compile_path()`] -- full pipeline entry points
//! - [`dump()`] -- render an artifact's target representation
//! - [`SourceMap::translate()`] -- generated position -> original
//!   position, for stack-trace remapping

pub mod artifact;
pub mod emit;
pub mod lower;
pub mod sourcemap;

use std::path::Path;

use weave_core::diag::Diagnostic;
use weave_core::source::{EmptyProvider, SourceProvider, SourceSet};
use weave_core::Analysis;

pub use artifact::{Artifact, EscalationAction, EscalationCond, EscalationPlan, Op, PolicyConfig};
pub use emit::dump;
pub use lower::generate;
pub use sourcemap::{OriginalPosition, SourceMap, SourceMapping};

/// Result of one compile invocation. The artifact is present only when
/// no error-severity diagnostics were produced; warnings alone do not
/// block generation.
pub struct CompileResult {
    pub artifact: Option<Artifact>,
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: SourceMap,
    /// Source registry backing diagnostic rendering and the map's
    /// bounds; owned by this invocation.
    pub sources: SourceSet,
}

impl CompileResult {
    pub fn succeeded(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Compile a single source text. Deterministic: a fixed source and file
/// id always produce byte-identical artifacts and identical
/// diagnostics. Imports resolve against nothing and report `E0005`.
pub fn compile(source: &str, file_id: &str) -> CompileResult {
    compile_with_provider(file_id, source, &EmptyProvider)
}

/// Compile with imports resolved through the given provider.
pub fn compile_with_provider(
    root_name: &str,
    root_text: &str,
    provider: &dyn SourceProvider,
) -> CompileResult {
    let (analysis, sources) = weave_core::analyze_source(root_name, root_text, provider);
    finish(analysis, sources)
}

/// Compile from a root path, following imports on disk. `Err` is the
/// I/O-failure case (root unreadable) that maps to exit code 2.
pub fn compile_path(path: &Path) -> Result<CompileResult, std::io::Error> {
    let (analysis, sources) = weave_core::analyze_path(path)?;
    Ok(finish(analysis, sources))
}

fn finish(analysis: Analysis, sources: SourceSet) -> CompileResult {
    if analysis.has_errors() {
        return CompileResult {
            artifact: None,
            diagnostics: analysis.diagnostics,
            source_map: SourceMap::new(),
            sources,
        };
    }
    let (artifact, source_map) = lower::generate(&analysis, &sources);
    CompileResult {
        artifact: Some(artifact),
        diagnostics: analysis.diagnostics,
        source_map,
        sources,
    }
}
