//! Validation-only entry point: `check(source, file_id)`.
//!
//! Runs the full front end and analyzer and returns the diagnostics
//! plus summary counts for the "valid (1 model, 1 agent)" report line.
//! No artifact is produced.

use std::path::Path;

use crate::analyze::{self, Analysis};
use crate::ast;
use crate::diag::Diagnostic;
use crate::source::SourceSet;
use crate::symbols::DeclKind;

/// Declaration counts reported alongside a clean `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub models: usize,
    pub agents: usize,
    pub flows: usize,
    pub handlers: usize,
}

impl Summary {
    pub fn of(analysis: &Analysis) -> Self {
        let handlers = analysis
            .units
            .iter()
            .flat_map(|u| u.decls.iter())
            .filter(|d| matches!(d, ast::Decl::Handler(_)))
            .count();
        Summary {
            models: analysis.symbols.count_of(DeclKind::Model),
            agents: analysis.symbols.count_of(DeclKind::Agent),
            flows: analysis.symbols.count_of(DeclKind::Flow),
            handlers,
        }
    }

    /// `"1 model, 2 agents"` -- nonzero counts only, declaration order.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (count, noun) in [
            (self.models, "model"),
            (self.agents, "agent"),
            (self.flows, "flow"),
            (self.handlers, "handler"),
        ] {
            if count > 0 {
                let plural = if count == 1 { "" } else { "s" };
                parts.push(format!("{} {}{}", count, noun, plural));
            }
        }
        if parts.is_empty() {
            "no declarations".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub struct CheckReport {
    pub diagnostics: Vec<Diagnostic>,
    pub summary: Summary,
    pub sources: SourceSet,
}

impl CheckReport {
    pub fn is_valid(&self) -> bool {
        !crate::diag::has_errors(&self.diagnostics)
    }
}

/// Validate a single source text. Imports report `E0005`.
pub fn check(source: &str, file_id: &str) -> CheckReport {
    let (analysis, sources) = analyze::analyze_single(file_id, source);
    report(analysis, sources)
}

/// Validate a file from disk, following imports. `Err` means the root
/// could not be read at all (the exit-code-2 case).
pub fn check_path(path: &Path) -> Result<CheckReport, std::io::Error> {
    let (analysis, sources) = analyze::analyze_path(path)?;
    Ok(report(analysis, sources))
}

fn report(analysis: Analysis, sources: SourceSet) -> CheckReport {
    let summary = Summary::of(&analysis);
    CheckReport {
        diagnostics: analysis.diagnostics,
        summary,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_describes_nonzero_counts() {
        let report = check(
            "model main = \"gpt-4.1\"\n\
             prompt p\n    \"\"\"x\"\"\"\n\
             agent a\n    instruction p\n",
            "main.weave",
        );
        assert!(report.is_valid(), "{:?}", report.diagnostics);
        assert_eq!(report.summary.describe(), "1 model, 1 agent");
    }

    #[test]
    fn empty_source_has_no_declarations() {
        let report = check("", "main.weave");
        assert!(report.is_valid());
        assert_eq!(report.summary.describe(), "no declarations");
    }
}
