//! Lexer and indentation preprocessor.
//!
//! Turns raw text into a token stream, synthesizing `Newline`, `Indent`
//! and `Dedent` tokens from a stack of column widths. Lexing never stops
//! at the first problem: invalid characters and indentation mismatches
//! are recorded as diagnostics and the lexer realigns best-effort so
//! later stages can still report their own findings.
//!
//! Triple-quoted prompt bodies are opaque: no tokenization happens
//! inside them and `${...}` interpolation markers are preserved verbatim
//! for the runtime.

use crate::diag::{Code, Diagnostic, Span};
use crate::source::FileId;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifiers and keywords -- distinguished in the parser
    Word(String),
    /// Flow variable, `$name` (stored without the sigil)
    Var(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    /// Triple-quoted prompt body, kept verbatim
    Text(String),
    /// Integer literal
    Int(i64),
    /// Decimal literal -- kept as string to preserve exact representation
    Float(String),
    // Punctuation and operators
    Eq,
    EqEq,
    Neq,
    /// `~`, normalized equality
    Tilde,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    Colon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    // Synthesized layout tokens
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    /// Index into `chars` of the first char of the current line.
    line_start: usize,
    file: FileId,
    tokens: Vec<Token>,
    diags: Vec<Diagnostic>,
    indents: Vec<u32>,
    src_len: usize,
}

/// Tokenize one file. Returns the token stream (always terminated by
/// `Eof`) together with any lexical diagnostics (`E0007`, `E0008`).
pub fn tokenize(src: &str, file: FileId) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lx = Lexer {
        chars: src.chars().collect(),
        pos: 0,
        line: 1,
        line_start: 0,
        file,
        tokens: Vec::new(),
        diags: Vec::new(),
        indents: vec![0],
        src_len: 0,
    };
    lx.src_len = lx.chars.len();
    lx.run();
    (lx.tokens, lx.diags)
}

impl Lexer {
    fn col(&self) -> u32 {
        (self.pos - self.line_start) as u32 + 1
    }

    fn span_here(&self, len: u32) -> Span {
        Span::new(self.file, self.line, self.col(), len)
    }

    fn push(&mut self, tok: Tok, span: Span) {
        self.tokens.push(Token { tok, span });
    }

    fn error(&mut self, code: Code, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic::new(code, span, message));
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn run(&mut self) {
        loop {
            self.handle_line_start();
            if self.pos >= self.src_len {
                break;
            }
            self.lex_line();
        }
        // Close the final line and any open blocks.
        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.tok, Tok::Newline))
        {
            let span = self.span_here(1);
            self.push(Tok::Newline, span);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            let span = Span::new(self.file, self.line, 1, 1);
            self.push(Tok::Dedent, span);
        }
        let span = self.span_here(1);
        self.push(Tok::Eof, span);
    }

    /// Measure leading whitespace, skip blank and comment-only lines,
    /// and emit `Indent`/`Dedent` against the width stack.
    fn handle_line_start(&mut self) {
        loop {
            let mut width = 0u32;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        width += 1;
                        self.pos += 1;
                    }
                    '\t' => {
                        let span = self.span_here(1);
                        self.error(
                            Code::E0008,
                            span,
                            "tab character in indentation; use spaces",
                        );
                        width += 1;
                        self.pos += 1;
                    }
                    '\r' => {
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank line: consume and re-measure the next one.
                Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                    continue;
                }
                // Comment-only line: layout-neutral.
                Some('#') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                    continue;
                }
                None => return,
                Some(_) => {
                    self.apply_indent(width);
                    return;
                }
            }
        }
    }

    fn apply_indent(&mut self, width: u32) {
        let top = *self.indents.last().unwrap_or(&0);
        if width > top {
            self.indents.push(width);
            let span = Span::new(self.file, self.line, 1, width.max(1));
            self.push(Tok::Indent, span);
            return;
        }
        while *self.indents.last().unwrap_or(&0) > width {
            self.indents.pop();
            let span = Span::new(self.file, self.line, 1, 1);
            self.push(Tok::Dedent, span);
        }
        let top = *self.indents.last().unwrap_or(&0);
        if top != width {
            // Dedent to a width that was never pushed. Report it and
            // realign to the enclosing level so lexing can continue.
            let span = Span::new(self.file, self.line, width + 1, 1);
            self.error(
                Code::E0008,
                span,
                format!(
                    "unindent to column {} does not match any outer indentation level",
                    width + 1
                ),
            );
        }
    }

    /// Lex tokens until the end of the current line.
    fn lex_line(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    let span = self.span_here(1);
                    self.push(Tok::Newline, span);
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                    return;
                }
                '\r' => {
                    self.pos += 1;
                }
                ' ' | '\t' => {
                    self.pos += 1;
                }
                '#' => {
                    while self.peek().is_some_and(|ch| ch != '\n') {
                        self.pos += 1;
                    }
                }
                '"' => {
                    if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
                        self.lex_prompt_body();
                    } else {
                        self.lex_string();
                    }
                }
                '$' => self.lex_var(),
                c if c.is_ascii_digit() => self.lex_number(),
                c if c.is_alphabetic() || c == '_' => self.lex_word(),
                _ => self.lex_operator(c),
            }
        }
    }

    fn lex_operator(&mut self, c: char) {
        let two = |lx: &Lexer| lx.peek_at(1);
        let (tok, len) = match c {
            '=' if two(self) == Some('=') => (Tok::EqEq, 2),
            '=' => (Tok::Eq, 1),
            '!' if two(self) == Some('=') => (Tok::Neq, 2),
            '~' => (Tok::Tilde, 1),
            '<' if two(self) == Some('=') => (Tok::Lte, 2),
            '<' => (Tok::Lt, 1),
            '>' if two(self) == Some('=') => (Tok::Gte, 2),
            '>' => (Tok::Gt, 1),
            '+' => (Tok::Plus, 1),
            '-' => (Tok::Minus, 1),
            '*' => (Tok::Star, 1),
            '/' => (Tok::Slash, 1),
            ':' => (Tok::Colon, 1),
            ',' => (Tok::Comma, 1),
            '.' => (Tok::Dot, 1),
            '(' => (Tok::LParen, 1),
            ')' => (Tok::RParen, 1),
            '[' => (Tok::LBracket, 1),
            ']' => (Tok::RBracket, 1),
            _ => {
                // Invalid character: report, skip, keep lexing.
                let span = self.span_here(1);
                self.error(Code::E0007, span, format!("invalid character '{}'", c));
                self.pos += 1;
                return;
            }
        };
        let span = self.span_here(len);
        self.push(tok, span);
        self.pos += len as usize;
    }

    fn lex_word(&mut self) {
        let start = self.pos;
        let span_start = self.span_here(0);
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let len = (self.pos - start) as u32;
        self.push(
            Tok::Word(word),
            Span::new(self.file, span_start.line, span_start.col, len),
        );
    }

    fn lex_var(&mut self) {
        let span_start = self.span_here(0);
        self.pos += 1; // '$'
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            self.error(
                Code::E0007,
                Span::new(self.file, span_start.line, span_start.col, 1),
                "expected identifier after '$'",
            );
            return;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        let len = (self.pos - start) as u32 + 1;
        self.push(
            Tok::Var(name),
            Span::new(self.file, span_start.line, span_start.col, len),
        );
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let span_start = self.span_here(0);
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let is_float = self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let len = (self.pos - start) as u32;
        let span = Span::new(self.file, span_start.line, span_start.col, len);
        if is_float {
            self.push(Tok::Float(text), span);
        } else {
            match text.parse::<i64>() {
                Ok(n) => self.push(Tok::Int(n), span),
                Err(_) => self.error(
                    Code::E0007,
                    span,
                    format!("invalid integer literal '{}'", text),
                ),
            }
        }
    }

    fn lex_string(&mut self) {
        let span_start = self.span_here(0);
        self.pos += 1; // opening quote
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    // Recover at end of line: the partial content still
                    // becomes a token so the parser can proceed.
                    self.error(
                        Code::E0007,
                        Span::new(self.file, span_start.line, span_start.col, 1),
                        "unterminated string literal",
                    );
                    break;
                }
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(other) => {
                            s.push('\\');
                            s.push(other);
                        }
                        None => continue,
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    s.push(c);
                    self.pos += 1;
                }
            }
        }
        let len = (self.col() - span_start.col).max(1);
        self.push(
            Tok::Str(s),
            Span::new(self.file, span_start.line, span_start.col, len),
        );
    }

    /// Triple-quoted prompt body: opaque, may span lines, `${...}` is
    /// preserved verbatim.
    fn lex_prompt_body(&mut self) {
        let span = self.span_here(3);
        self.pos += 3; // opening """
        let start = self.pos;
        loop {
            match self.peek() {
                None => {
                    self.error(Code::E0007, span, "unterminated prompt body");
                    break;
                }
                Some('"')
                    if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') =>
                {
                    break;
                }
                Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                }
                Some(_) => {
                    self.pos += 1;
                }
            }
        }
        let body: String = self.chars[start..self.pos.min(self.src_len)]
            .iter()
            .collect();
        if self.peek() == Some('"') {
            self.pos += 3; // closing """
        }
        self.push(Tok::Text(body), span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Tok>, Vec<Diagnostic>) {
        let (tokens, diags) = tokenize(src, FileId(0));
        (tokens.into_iter().map(|t| t.tok).collect(), diags)
    }

    #[test]
    fn indent_and_dedent_are_synthesized() {
        let (toks, diags) = lex("agent a\n    instruction p\nmodel m = \"x\"\n");
        assert!(diags.is_empty());
        let indents = toks.iter().filter(|t| **t == Tok::Indent).count();
        let dedents = toks.iter().filter(|t| **t == Tok::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn unmatched_dedent_reports_e0008_and_realigns() {
        // Opens a 4-space block, then dedents to 2 which was never pushed.
        let (toks, diags) = lex("agent a\n    instruction p\n  tools t\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Code::E0008);
        assert_eq!(diags[0].span.line, 3);
        assert_eq!(diags[0].span.col, 3);
        // Lexing continued past the mismatch.
        assert!(toks.iter().any(|t| *t == Tok::Word("tools".into())));
    }

    #[test]
    fn invalid_character_reports_e0007_and_is_skipped() {
        let (toks, diags) = lex("model m ? = \"x\"\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Code::E0007);
        assert!(diags[0].message.contains('?'));
        // The '=' after the bad character still lexes.
        assert!(toks.iter().any(|t| *t == Tok::Eq));
    }

    #[test]
    fn prompt_body_is_opaque() {
        let (toks, diags) = lex("prompt p\n    \"\"\"\n    Say ${thing} now\n    \"\"\"\n");
        assert!(diags.is_empty());
        let body = toks.iter().find_map(|t| match t {
            Tok::Text(s) => Some(s.clone()),
            _ => None,
        });
        let body = body.expect("prompt body token");
        assert!(body.contains("${thing}"));
        // No tokenization happened inside the body.
        assert!(!toks.iter().any(|t| *t == Tok::Var("thing".into())));
    }

    #[test]
    fn comma_separated_names_lex_as_separate_tokens() {
        let (toks, diags) = lex("tools search, fetch\n");
        assert!(diags.is_empty());
        let words: Vec<&Tok> = toks
            .iter()
            .filter(|t| matches!(t, Tok::Word(_) | Tok::Comma))
            .collect();
        assert_eq!(
            words,
            vec![
                &Tok::Word("tools".into()),
                &Tok::Word("search".into()),
                &Tok::Comma,
                &Tok::Word("fetch".into()),
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_layout_neutral() {
        let (toks, diags) = lex("agent a\n\n    # comment\n    instruction p\n");
        assert!(diags.is_empty());
        assert_eq!(toks.iter().filter(|t| **t == Tok::Indent).count(), 1);
    }

    #[test]
    fn operators_and_literals() {
        let (toks, diags) = lex("$x == 3.5 ~ \"done\" != 7\n");
        assert!(diags.is_empty());
        assert!(toks.contains(&Tok::Var("x".into())));
        assert!(toks.contains(&Tok::EqEq));
        assert!(toks.contains(&Tok::Float("3.5".into())));
        assert!(toks.contains(&Tok::Tilde));
        assert!(toks.contains(&Tok::Str("done".into())));
        assert!(toks.contains(&Tok::Neq));
        assert!(toks.contains(&Tok::Int(7)));
    }

    #[test]
    fn eof_closes_open_blocks() {
        let (toks, _) = lex("flow f do\n    return");
        let trailing: Vec<&Tok> = toks.iter().rev().take(3).collect();
        // ... Newline Dedent Eof
        assert_eq!(trailing[0], &Tok::Eof);
        assert_eq!(trailing[1], &Tok::Dedent);
    }
}
