//! Diagnostic types and rendering.
//!
//! Every rule violation anywhere in the pipeline becomes a [`Diagnostic`]
//! value returned to the caller -- the compiler never panics on user
//! input. The code taxonomy (`E0001`..`E0011`, `W0001`, `W0002`) is part
//! of the stable interface; severity derives from the code and the two
//! must never disagree in rendered output.

use crate::source::{FileId, SourceSet};
use serde::Serialize;
use std::fmt;

// ──────────────────────────────────────────────
// Spans
// ──────────────────────────────────────────────

/// A source position: file, 1-based line and column, and the length of
/// the offending run of characters. Every token, CST node, AST node and
/// diagnostic carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub file: FileId,
    pub line: u32,
    pub col: u32,
    pub len: u32,
}

impl Span {
    pub fn new(file: FileId, line: u32, col: u32, len: u32) -> Self {
        Span { file, line, col, len }
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(self.0)
    }
}

// ──────────────────────────────────────────────
// Codes and severity
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

/// The closed diagnostic code taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Code {
    /// Undefined reference
    E0001,
    /// Variable used before definition
    E0002,
    /// Duplicate definition
    E0003,
    /// Type mismatch
    E0004,
    /// Import not found
    E0005,
    /// Circular import
    E0006,
    /// Invalid token or unexpected end of input
    E0007,
    /// Indentation mismatch
    E0008,
    /// Invalid guardrail action for context
    E0009,
    /// Missing required property
    E0010,
    /// Circular agent reference
    E0011,
    /// Unbounded loop
    W0001,
    /// Agent declares both composition patterns
    W0002,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::E0001 => "E0001",
            Code::E0002 => "E0002",
            Code::E0003 => "E0003",
            Code::E0004 => "E0004",
            Code::E0005 => "E0005",
            Code::E0006 => "E0006",
            Code::E0007 => "E0007",
            Code::E0008 => "E0008",
            Code::E0009 => "E0009",
            Code::E0010 => "E0010",
            Code::E0011 => "E0011",
            Code::W0001 => "W0001",
            Code::W0002 => "W0002",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Code::W0001 | Code::W0002 => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Diagnostic
// ──────────────────────────────────────────────

/// A structured compiler message: code, severity, location, help.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Code,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Related positions, e.g. the first declaration for a duplicate.
    pub secondary: Vec<Span>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(code: Code, span: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: code.severity(),
            message: message.into(),
            span,
            secondary: Vec::new(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_secondary(mut self, span: Span) -> Self {
        self.secondary.push(span);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Sort diagnostics by (file, line, column, code) for deterministic
/// output across repeated invocations.
pub fn sort(diags: &mut [Diagnostic]) {
    diags.sort_by_key(|d| (d.span.file, d.span.line, d.span.col, d.code));
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

/// Exit-code policy: 0 when nothing error-severity is present, 1
/// otherwise. Under `strict`, warnings count as failures. I/O-level
/// failures (exit 2) are mapped by the CLI, not here.
pub fn exit_code(diags: &[Diagnostic], strict: bool) -> i32 {
    let failing = diags
        .iter()
        .any(|d| d.is_error() || (strict && d.severity == Severity::Warning));
    i32::from(failing)
}

// ──────────────────────────────────────────────
// Rendering
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable code frames with carets.
    Text,
    /// One JSON record per diagnostic.
    Structured,
}

/// Render diagnostics in the requested format.
pub fn render(diags: &[Diagnostic], format: Format, sources: &SourceSet) -> String {
    match format {
        Format::Text => diags
            .iter()
            .map(|d| render_text(d, sources))
            .collect::<Vec<_>>()
            .join("\n"),
        Format::Structured => diags
            .iter()
            .map(|d| render_record(d, sources).to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn severity_label(s: Severity) -> &'static str {
    match s {
        Severity::Error => "error",
        Severity::Warning => "warning",
    }
}

/// Code frame: the offending source line with carets under the exact
/// span, plus an optional help line.
fn render_text(d: &Diagnostic, sources: &SourceSet) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}[{}]: {}\n",
        severity_label(d.severity),
        d.code,
        d.message
    ));
    out.push_str(&format!(
        "  --> {}:{}:{}\n",
        sources.name(d.span.file),
        d.span.line,
        d.span.col
    ));

    let gutter = d.span.line.to_string().len().max(2);
    if let Some(line_text) = sources.line(d.span.file, d.span.line) {
        out.push_str(&format!("{:>width$} |\n", "", width = gutter));
        out.push_str(&format!(
            "{:>width$} | {}\n",
            d.span.line,
            line_text,
            width = gutter
        ));
        let pad = (d.span.col.max(1) - 1) as usize;
        let carets = "^".repeat(d.span.len.max(1) as usize);
        out.push_str(&format!(
            "{:>width$} | {}{}\n",
            "",
            " ".repeat(pad),
            carets,
            width = gutter
        ));
    }
    if let Some(help) = &d.help {
        out.push_str(&format!("{:>width$} = help: {}\n", "", help, width = gutter));
    }
    out
}

fn render_record(d: &Diagnostic, sources: &SourceSet) -> serde_json::Value {
    serde_json::json!({
        "code":     d.code.as_str(),
        "severity": severity_label(d.severity),
        "file":     sources.name(d.span.file),
        "line":     d.span.line,
        "column":   d.span.col,
        "message":  d.message,
        "help":     d.help,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_file() -> (SourceSet, FileId) {
        let mut set = SourceSet::new();
        let id = set.add("main.weave", "model main = \"gpt\"\n  using model x\n");
        (set, id)
    }

    #[test]
    fn severity_derives_from_code() {
        assert_eq!(Code::E0001.severity(), Severity::Error);
        assert_eq!(Code::W0002.severity(), Severity::Warning);
    }

    #[test]
    fn text_frame_has_caret_under_span() {
        let (set, id) = one_file();
        let d = Diagnostic::new(Code::E0001, Span::new(id, 2, 15, 1), "unknown model 'x'")
            .with_help("defined models are: main");
        let text = render_text(&d, &set);
        assert!(text.starts_with("error[E0001]: unknown model 'x'"));
        assert!(text.contains("--> main.weave:2:15"));
        let caret_line = text
            .lines()
            .find(|l| l.trim_end().ends_with('^'))
            .expect("caret line");
        // 14 cols of padding inside the frame, then the caret
        assert!(caret_line.ends_with(&format!("| {}^", " ".repeat(14))));
        assert!(text.contains("= help: defined models are: main"));
    }

    #[test]
    fn warning_renders_with_warning_label() {
        let (set, id) = one_file();
        let d = Diagnostic::new(Code::W0002, Span::new(id, 1, 1, 5), "both delegate and use");
        let text = render_text(&d, &set);
        assert!(text.starts_with("warning[W0002]"));
        let record = render_record(&d, &set);
        assert_eq!(record["severity"], "warning");
    }

    #[test]
    fn structured_record_fields() {
        let (set, id) = one_file();
        let d = Diagnostic::new(Code::E0003, Span::new(id, 1, 7, 4), "duplicate definition");
        let v = render_record(&d, &set);
        assert_eq!(v["code"], "E0003");
        assert_eq!(v["file"], "main.weave");
        assert_eq!(v["line"], 1);
        assert_eq!(v["column"], 7);
    }

    #[test]
    fn exit_code_policy() {
        let (_, id) = one_file();
        let warn = Diagnostic::new(Code::W0001, Span::new(id, 1, 1, 1), "w");
        let err = Diagnostic::new(Code::E0007, Span::new(id, 1, 1, 1), "e");
        assert_eq!(exit_code(&[], false), 0);
        assert_eq!(exit_code(&[warn.clone()], false), 0);
        assert_eq!(exit_code(&[warn.clone()], true), 1);
        assert_eq!(exit_code(&[warn, err], false), 1);
    }

    #[test]
    fn sort_is_by_position_then_code() {
        let (_, id) = one_file();
        let mut diags = vec![
            Diagnostic::new(Code::E0003, Span::new(id, 5, 1, 1), "later"),
            Diagnostic::new(Code::E0001, Span::new(id, 2, 9, 1), "mid"),
            Diagnostic::new(Code::E0008, Span::new(id, 2, 1, 1), "early"),
        ];
        sort(&mut diags);
        let lines: Vec<u32> = diags.iter().map(|d| d.span.line).collect();
        assert_eq!(lines, vec![2, 2, 5]);
        assert_eq!(diags[0].code, Code::E0008);
    }
}
