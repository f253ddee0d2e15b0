//! Recursive-descent parser: token stream -> concrete syntax tree.
//!
//! Grammar rules cover imports, the declaration forms (`model`, `tool`,
//! `schema`, `prompt`, `agent`, `policy`/`retry`/`timeout`, `on ... do
//! ... end` handlers, `flow ... do ... end`) and the flow statement and
//! expression grammar. Declaration property blocks are indentation
//! blocks; flow and handler bodies are `do ... end` blocks whose lines
//! must still indent consistently.
//!
//! Unrecoverable token-stream errors (unexpected end of input, a
//! missing closing `end`) abort parsing for the file: no partial CST is
//! handed to later stages.

use crate::cst::*;
use crate::diag::{Code, Diagnostic, Span};
use crate::lexer::{Tok, Token};

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// Parse one file's token stream. A hard error aborts the file.
pub fn parse(tokens: &[Token]) -> Result<SourceUnit, Diagnostic> {
    let mut p = Parser { tokens, pos: 0 };
    let mut decls = Vec::new();
    p.skip_newlines();
    while !p.at_eof() {
        decls.push(p.parse_decl()?);
        p.skip_newlines();
    }
    Ok(SourceUnit { decls })
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Word(w) => format!("'{}'", w),
        Tok::Var(v) => format!("'${}'", v),
        Tok::Str(_) => "string literal".into(),
        Tok::Text(_) => "prompt body".into(),
        Tok::Int(n) => format!("'{}'", n),
        Tok::Float(f) => format!("'{}'", f),
        Tok::Eq => "'='".into(),
        Tok::EqEq => "'=='".into(),
        Tok::Neq => "'!='".into(),
        Tok::Tilde => "'~'".into(),
        Tok::Lt => "'<'".into(),
        Tok::Lte => "'<='".into(),
        Tok::Gt => "'>'".into(),
        Tok::Gte => "'>='".into(),
        Tok::Plus => "'+'".into(),
        Tok::Minus => "'-'".into(),
        Tok::Star => "'*'".into(),
        Tok::Slash => "'/'".into(),
        Tok::Colon => "':'".into(),
        Tok::Comma => "','".into(),
        Tok::Dot => "'.'".into(),
        Tok::LParen => "'('".into(),
        Tok::RParen => "')'".into(),
        Tok::LBracket => "'['".into(),
        Tok::RBracket => "']'".into(),
        Tok::Newline => "end of line".into(),
        Tok::Indent => "indented block".into(),
        Tok::Dedent => "end of block".into(),
        Tok::Eof => "end of input".into(),
    }
}

impl<'a> Parser<'a> {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Tok {
        &self.cur().tok
    }

    fn span(&self) -> Span {
        self.cur().span
    }

    fn advance(&mut self) -> &Token {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Tok::Eof)
    }

    fn err(&self, msg: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Code::E0007, self.span(), msg)
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        if self.at_eof() {
            self.err(format!("unexpected end of input, expected {}", expected))
        } else {
            self.err(format!(
                "expected {}, got {}",
                expected,
                describe(self.peek())
            ))
        }
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Tok::Word(x) if x == w)
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.is_word(w) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<Span, Diagnostic> {
        let span = self.span();
        if self.eat_word(w) {
            Ok(span)
        } else {
            Err(self.unexpected(&format!("'{}'", w)))
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<Span, Diagnostic> {
        let span = self.span();
        if *self.peek() == tok {
            self.advance();
            Ok(span)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn take_ident(&mut self) -> Result<Ident, Diagnostic> {
        let span = self.span();
        if let Tok::Word(w) = self.peek().clone() {
            self.advance();
            Ok(Ident { name: w, span })
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn take_str(&mut self) -> Result<(String, Span), Diagnostic> {
        let span = self.span();
        if let Tok::Str(s) = self.peek().clone() {
            self.advance();
            Ok((s, span))
        } else {
            Err(self.unexpected("string literal"))
        }
    }

    fn take_lit(&mut self) -> Result<Lit, Diagnostic> {
        let span = self.span();
        let value = match self.peek().clone() {
            Tok::Str(s) => LitValue::Str(s),
            Tok::Int(n) => LitValue::Int(n),
            Tok::Float(f) => LitValue::Float(f),
            Tok::Word(w) if w == "true" => LitValue::Bool(true),
            Tok::Word(w) if w == "false" => LitValue::Bool(false),
            Tok::Word(w) if w == "null" => LitValue::Null,
            _ => return Err(self.unexpected("literal")),
        };
        self.advance();
        Ok(Lit { value, span })
    }

    fn expect_newline(&mut self) -> Result<(), Diagnostic> {
        self.expect(Tok::Newline, "end of line").map(|_| ())
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Tok::Newline) {
            self.advance();
        }
    }

    /// Comma-separated identifier list: `a, b, c`. Commas separate;
    /// they never become list elements.
    fn take_name_list(&mut self) -> Result<Vec<Ident>, Diagnostic> {
        let mut names = vec![self.take_ident()?];
        while *self.peek() == Tok::Comma {
            self.advance();
            names.push(self.take_ident()?);
        }
        Ok(names)
    }

    // ──────────────────────────────────────────
    // Declarations
    // ──────────────────────────────────────────

    fn parse_decl(&mut self) -> Result<Decl, Diagnostic> {
        let span = self.span();
        let keyword = match self.peek() {
            Tok::Word(w) => w.clone(),
            _ => return Err(self.unexpected("declaration")),
        };
        match keyword.as_str() {
            "import" => {
                self.advance();
                let (path, _) = self.take_str()?;
                self.expect_newline()?;
                Ok(Decl::Import { path, span })
            }
            "model" => self.parse_model(span),
            "tool" => self.parse_tool(span),
            "schema" => self.parse_schema(span),
            "prompt" => self.parse_prompt(span),
            "agent" => self.parse_agent(span),
            "policy" => self.parse_policy(span, PolicyKeyword::Policy),
            "retry" => self.parse_policy(span, PolicyKeyword::Retry),
            "timeout" => self.parse_policy(span, PolicyKeyword::Timeout),
            "on" => self.parse_handler(span),
            "flow" => self.parse_flow(span),
            other => Err(self.err(format!("expected declaration, found '{}'", other))),
        }
    }

    fn parse_model(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // model
        let name = self.take_ident()?;
        self.expect(Tok::Eq, "'='")?;
        let (target, _) = self.take_str()?;
        self.expect_newline()?;
        let params = self.parse_prop_block()?;
        Ok(Decl::Model {
            name,
            target,
            params,
            span,
        })
    }

    fn parse_tool(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // tool
        let name = self.take_ident()?;
        let binding = if *self.peek() == Tok::Eq {
            self.advance();
            Some(self.take_str()?.0)
        } else {
            None
        };
        self.expect_newline()?;
        let mut props = Vec::new();
        if *self.peek() == Tok::Indent {
            self.advance();
            while *self.peek() != Tok::Dedent {
                let pspan = self.span();
                if self.eat_word("description") {
                    let (text, _) = self.take_str()?;
                    props.push(ToolProp::Description(text, pspan));
                } else if self.eat_word("param") {
                    let pname = self.take_ident()?;
                    self.expect(Tok::Colon, "':'")?;
                    let ty = self.parse_type()?;
                    props.push(ToolProp::Param {
                        name: pname,
                        ty,
                        span: pspan,
                    });
                } else {
                    return Err(self.unexpected("'description' or 'param'"));
                }
                self.expect_newline()?;
            }
            self.advance(); // dedent
        }
        Ok(Decl::Tool {
            name,
            binding,
            props,
            span,
        })
    }

    fn parse_schema(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // schema
        let name = self.take_ident()?;
        self.expect_newline()?;
        let mut fields = Vec::new();
        if *self.peek() == Tok::Indent {
            self.advance();
            while *self.peek() != Tok::Dedent {
                let fspan = self.span();
                self.expect_word("field")?;
                let fname = self.take_ident()?;
                self.expect(Tok::Colon, "':'")?;
                let ty = self.parse_type()?;
                let default = if *self.peek() == Tok::Eq {
                    self.advance();
                    Some(self.take_lit()?)
                } else {
                    None
                };
                self.expect_newline()?;
                fields.push(FieldDef {
                    name: fname,
                    ty,
                    default,
                    span: fspan,
                });
            }
            self.advance(); // dedent
        }
        Ok(Decl::Schema { name, fields, span })
    }

    fn parse_type(&mut self) -> Result<TypeName, Diagnostic> {
        let ident = self.take_ident()?;
        match ident.name.as_str() {
            "text" => Ok(TypeName::Text(ident.span)),
            "number" => Ok(TypeName::Number(ident.span)),
            "bool" => Ok(TypeName::Bool(ident.span)),
            "list" => {
                self.expect(Tok::Lt, "'<'")?;
                let inner = self.parse_type()?;
                self.expect(Tok::Gt, "'>'")?;
                Ok(TypeName::List(Box::new(inner), ident.span))
            }
            _ => Ok(TypeName::Named(ident)),
        }
    }

    fn parse_prompt(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // prompt
        let name = self.take_ident()?;
        self.expect_newline()?;
        let mut clauses = Vec::new();
        let mut body = None;
        if *self.peek() == Tok::Indent {
            self.advance();
            while *self.peek() != Tok::Dedent {
                let cspan = self.span();
                match self.peek().clone() {
                    Tok::Word(w) if w == "using" => {
                        self.advance();
                        self.expect_word("model")?;
                        let target = self.take_model_name()?;
                        clauses.push(PromptClause::UsingModel(target));
                    }
                    Tok::Word(w) if w == "expecting" => {
                        self.advance();
                        clauses.push(PromptClause::Expecting(self.take_ident()?));
                    }
                    Tok::Word(w) if w == "escalate" => {
                        self.advance();
                        self.expect_word("if")?;
                        let cond = self.parse_esc_cond()?;
                        clauses.push(PromptClause::EscalateIf(cond, cspan));
                    }
                    Tok::Text(text) => {
                        self.advance();
                        body = Some((text, cspan));
                    }
                    _ => {
                        return Err(self.unexpected(
                            "'using', 'expecting', 'escalate' or a prompt body",
                        ))
                    }
                }
                self.expect_newline()?;
            }
            self.advance(); // dedent
        }
        Ok(Decl::Prompt {
            name,
            clauses,
            body,
            span,
        })
    }

    /// `using model` accepts a bare identifier or a quoted string; both
    /// are name references into the model namespace.
    fn take_model_name(&mut self) -> Result<Ident, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Tok::Word(w) => {
                self.advance();
                Ok(Ident { name: w, span })
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Ident { name: s, span })
            }
            _ => Err(self.unexpected("model name")),
        }
    }

    fn parse_esc_cond(&mut self) -> Result<EscCond, Diagnostic> {
        match self.peek().clone() {
            Tok::Tilde => {
                self.advance();
                Ok(EscCond::Normalized(self.take_lit()?))
            }
            Tok::EqEq => {
                self.advance();
                Ok(EscCond::Exact(self.take_lit()?))
            }
            Tok::Neq => {
                self.advance();
                Ok(EscCond::NotEq(self.take_lit()?))
            }
            Tok::Word(w) if w == "contains" => {
                self.advance();
                Ok(EscCond::Contains(self.take_lit()?))
            }
            _ => Ok(EscCond::Expr(self.parse_expr()?)),
        }
    }

    fn parse_agent(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // agent
        let name = self.take_ident()?;
        self.expect_newline()?;
        let mut props = Vec::new();
        if *self.peek() == Tok::Indent {
            self.advance();
            while *self.peek() != Tok::Dedent {
                let pspan = self.span();
                let key = match self.peek() {
                    Tok::Word(w) => w.clone(),
                    _ => return Err(self.unexpected("agent property")),
                };
                self.advance();
                let prop = match key.as_str() {
                    "description" => AgentProp::Description(self.take_str()?.0, pspan),
                    "instruction" => AgentProp::Instruction(self.take_ident()?),
                    "tools" => AgentProp::Tools(self.take_name_list()?, pspan),
                    "delegate" => AgentProp::Delegate(self.take_name_list()?, pspan),
                    "use" => AgentProp::Use(self.take_name_list()?, pspan),
                    "retry" => AgentProp::Retry(self.take_ident()?),
                    "timeout" => AgentProp::Timeout(self.take_ident()?),
                    other => {
                        return Err(self.err(format!("unknown agent property '{}'", other)))
                    }
                };
                props.push(prop);
                self.expect_newline()?;
            }
            self.advance(); // dedent
        }
        Ok(Decl::Agent { name, props, span })
    }

    fn parse_policy(&mut self, span: Span, keyword: PolicyKeyword) -> Result<Decl, Diagnostic> {
        self.advance(); // policy | retry | timeout
        let name = self.take_ident()?;
        self.expect_newline()?;
        let props = self.parse_prop_block()?;
        Ok(Decl::Policy {
            name,
            keyword,
            props,
            span,
        })
    }

    /// Generic `key value` property block (models, policies).
    fn parse_prop_block(&mut self) -> Result<Vec<Prop>, Diagnostic> {
        let mut props = Vec::new();
        if *self.peek() != Tok::Indent {
            return Ok(props);
        }
        self.advance();
        while *self.peek() != Tok::Dedent {
            let key = self.take_ident()?;
            let value = match self.peek().clone() {
                Tok::Word(w) if !matches!(w.as_str(), "true" | "false" | "null") => {
                    let span = self.span();
                    self.advance();
                    PropValue::Word(Ident { name: w, span })
                }
                _ => PropValue::Lit(self.take_lit()?),
            };
            props.push(Prop { key, value });
            self.expect_newline()?;
        }
        self.advance(); // dedent
        Ok(props)
    }

    fn parse_handler(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // on
        let event = self.take_ident()?;
        self.expect_word("do")?;
        self.expect_newline()?;
        let mut actions = Vec::new();
        if *self.peek() == Tok::Indent {
            self.advance();
            while *self.peek() != Tok::Dedent {
                let aspan = self.span();
                let action = if self.eat_word("block") {
                    let reason = if let Tok::Str(_) = self.peek() {
                        Some(self.take_str()?.0)
                    } else {
                        None
                    };
                    Action::Block(reason, aspan)
                } else if self.eat_word("redact") {
                    Action::Redact(aspan)
                } else if self.eat_word("warn") {
                    Action::Warn(self.take_str()?.0, aspan)
                } else if self.eat_word("allow") {
                    Action::Allow(aspan)
                } else {
                    return Err(self.unexpected("guardrail action"));
                };
                actions.push(action);
                self.expect_newline()?;
            }
            self.advance(); // dedent
        }
        self.expect_end()?;
        self.expect_newline()?;
        Ok(Decl::Handler {
            event,
            actions,
            span,
        })
    }

    fn parse_flow(&mut self, span: Span) -> Result<Decl, Diagnostic> {
        self.advance(); // flow
        let name = self.take_ident()?;
        let body = self.parse_do_block()?;
        self.expect_newline()?;
        Ok(Decl::Flow { name, body, span })
    }

    // ──────────────────────────────────────────
    // Flow statements
    // ──────────────────────────────────────────

    /// `do NEWLINE INDENT stmt* DEDENT end`. The caller consumes the
    /// trailing newline, because `if` blocks may chain `else` after it.
    fn parse_do_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect_word("do")?;
        self.expect_newline()?;
        let mut body = Vec::new();
        if *self.peek() == Tok::Indent {
            self.advance();
            while !matches!(self.peek(), Tok::Dedent | Tok::Eof) {
                body.push(self.parse_stmt()?);
            }
            self.expect(Tok::Dedent, "end of block")?;
        }
        self.expect_end()?;
        Ok(body)
    }

    fn expect_end(&mut self) -> Result<(), Diagnostic> {
        if self.at_eof() {
            Err(self.err("unexpected end of input, missing closing 'end'"))
        } else {
            self.expect_word("end").map(|_| ())
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Tok::Var(name) => {
                let var_span = self.span();
                self.advance();
                let var = Ident {
                    name,
                    span: var_span,
                };
                self.expect(Tok::Eq, "'='")?;
                let rhs = if self.is_word("run") || self.is_word("call") {
                    Rhs::Run(self.parse_run()?)
                } else {
                    Rhs::Expr(self.parse_expr()?)
                };
                self.expect_newline()?;
                Ok(Stmt::Assign { var, rhs, span })
            }
            Tok::Word(w) => match w.as_str() {
                "run" | "call" => {
                    let run = self.parse_run()?;
                    self.expect_newline()?;
                    Ok(Stmt::Run(run))
                }
                "if" => self.parse_if(span),
                "match" => self.parse_match(span),
                "loop" => self.parse_loop(span),
                "parallel" => {
                    self.advance();
                    let body = self.parse_do_block()?;
                    self.expect_newline()?;
                    Ok(Stmt::Parallel { body, span })
                }
                "return" => {
                    self.advance();
                    let value = if matches!(self.peek(), Tok::Newline) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect_newline()?;
                    Ok(Stmt::Return { value, span })
                }
                other => Err(self.err(format!("expected statement, found '{}'", other))),
            },
            _ => Err(self.unexpected("statement")),
        }
    }

    fn parse_run(&mut self) -> Result<RunStmt, Diagnostic> {
        let span = self.span();
        let kind = if self.eat_word("run") {
            if self.eat_word("agent") {
                RunKind::Agent
            } else if self.eat_word("flow") {
                RunKind::Flow
            } else {
                return Err(self.unexpected("'agent' or 'flow'"));
            }
        } else {
            self.expect_word("call")?;
            self.expect_word("llm")?;
            RunKind::Llm
        };
        let target = self.take_ident()?;
        let input = if self.eat_word("with") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let escalation = if self.is_word("on") {
            let espan = self.span();
            self.advance();
            self.expect_word("escalate")?;
            if kind == RunKind::Flow {
                return Err(Diagnostic::new(
                    Code::E0007,
                    espan,
                    "'on escalate' applies to 'run agent' and 'call llm', not 'run flow'",
                ));
            }
            let action = if self.eat_word("return") {
                let value = if matches!(self.peek(), Tok::Newline) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                EscAction::Return(value)
            } else if self.eat_word("continue") {
                EscAction::Continue
            } else if self.eat_word("abort") {
                EscAction::Abort
            } else {
                return Err(self.unexpected("'return', 'continue' or 'abort'"));
            };
            Some(EscHandler {
                action,
                span: espan,
            })
        } else {
            None
        };
        Ok(RunStmt {
            kind,
            target,
            input,
            escalation,
            span,
        })
    }

    fn parse_if(&mut self, span: Span) -> Result<Stmt, Diagnostic> {
        self.advance(); // if
        let cond = self.parse_expr()?;
        let then_body = self.parse_do_block()?;
        self.expect_newline()?;
        let else_body = if self.is_word("else") {
            self.advance();
            let body = self.parse_do_block()?;
            self.expect_newline()?;
            Some(body)
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        })
    }

    fn parse_match(&mut self, span: Span) -> Result<Stmt, Diagnostic> {
        self.advance(); // match
        let subject = self.parse_expr()?;
        self.expect_word("do")?;
        self.expect_newline()?;
        let mut arms = Vec::new();
        let mut default = None;
        if *self.peek() == Tok::Indent {
            self.advance();
            while !matches!(self.peek(), Tok::Dedent | Tok::Eof) {
                let aspan = self.span();
                if self.eat_word("case") {
                    let pattern = self.take_lit()?;
                    let body = self.parse_do_block()?;
                    self.expect_newline()?;
                    arms.push(MatchArm {
                        pattern,
                        body,
                        span: aspan,
                    });
                } else if self.is_word("else") {
                    if default.is_some() {
                        return Err(self.err("duplicate 'else' arm in match"));
                    }
                    self.advance();
                    let body = self.parse_do_block()?;
                    self.expect_newline()?;
                    default = Some(body);
                } else {
                    return Err(self.unexpected("'case' or 'else'"));
                }
            }
            self.expect(Tok::Dedent, "end of block")?;
        }
        self.expect_end()?;
        self.expect_newline()?;
        Ok(Stmt::Match {
            subject,
            arms,
            default,
            span,
        })
    }

    fn parse_loop(&mut self, span: Span) -> Result<Stmt, Diagnostic> {
        self.advance(); // loop
        let max = if self.eat_word("max") {
            let mspan = self.span();
            match self.peek().clone() {
                Tok::Int(n) if n > 0 => {
                    self.advance();
                    Some((n as u64, mspan))
                }
                Tok::Int(_) => {
                    return Err(self.err("loop bound must be a positive integer"))
                }
                _ => return Err(self.unexpected("loop bound")),
            }
        } else {
            None
        };
        let body = self.parse_do_block()?;
        self.expect_newline()?;
        Ok(Stmt::Loop { max, body, span })
    }

    // ──────────────────────────────────────────
    // Expressions
    // ──────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_and()?;
        while self.is_word("or") {
            self.advance();
            let rhs = self.parse_and()?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_not()?;
        while self.is_word("and") {
            self.advance();
            let rhs = self.parse_not()?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, Diagnostic> {
        if self.is_word("not") {
            let span = self.span();
            self.advance();
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_cmp()
    }

    /// Comparisons are non-associative: `a == b == c` is a parse error.
    fn parse_cmp(&mut self) -> Result<Expr, Diagnostic> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Tok::EqEq => Some(BinOp::Eq),
            Tok::Neq => Some(BinOp::Neq),
            Tok::Tilde => Some(BinOp::NormEq),
            Tok::Lt => Some(BinOp::Lt),
            Tok::Lte => Some(BinOp::Lte),
            Tok::Gt => Some(BinOp::Gt),
            Tok::Gte => Some(BinOp::Gte),
            Tok::Word(w) if w == "contains" => Some(BinOp::Contains),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.advance();
        let rhs = self.parse_add()?;
        let span = lhs.span();
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        })
    }

    fn parse_add(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            let span = lhs.span();
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        if *self.peek() == Tok::Minus {
            let span = self.span();
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Tok::Dot => {
                    let span = self.span();
                    self.advance();
                    let name = self.take_ident()?;
                    expr = Expr::Field {
                        base: Box::new(expr),
                        name: name.name,
                        span,
                    };
                }
                Tok::LBracket => {
                    let span = self.span();
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Tok::Var(name) => {
                self.advance();
                Ok(Expr::Var { name, span })
            }
            Tok::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::Str(_) | Tok::Int(_) | Tok::Float(_) => Ok(Expr::Lit(self.take_lit()?)),
            Tok::Word(w) if matches!(w.as_str(), "true" | "false" | "null") => {
                Ok(Expr::Lit(self.take_lit()?))
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::source::FileId;

    fn parse_src(src: &str) -> Result<SourceUnit, Diagnostic> {
        let (tokens, diags) = tokenize(src, FileId(0));
        assert!(diags.is_empty(), "unexpected lex diagnostics: {:?}", diags);
        parse(&tokens)
    }

    #[test]
    fn minimal_declarations() {
        let unit = parse_src(
            "model main = \"gpt-4.1\"\n\
             prompt p\n    \"\"\"hi\"\"\"\n\
             agent a\n    instruction p\n",
        )
        .unwrap();
        assert_eq!(unit.decls.len(), 3);
    }

    #[test]
    fn name_lists_are_independent_identifiers() {
        let unit = parse_src("agent a\n    tools search, fetch, wiki\n").unwrap();
        let Decl::Agent { props, .. } = &unit.decls[0] else {
            panic!("expected agent");
        };
        let AgentProp::Tools(names, _) = &props[0] else {
            panic!("expected tools prop");
        };
        let names: Vec<&str> = names.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["search", "fetch", "wiki"]);
    }

    #[test]
    fn missing_end_is_e0007() {
        let err = parse_src("flow f do\n    return 1\n").unwrap_err();
        assert_eq!(err.code, Code::E0007);
        assert!(err.message.contains("missing closing 'end'"));
    }

    #[test]
    fn run_with_escalation_handler() {
        let unit = parse_src(
            "flow f do\n    $t = run agent a on escalate return $t\nend\n",
        )
        .unwrap();
        let Decl::Flow { body, .. } = &unit.decls[0] else {
            panic!("expected flow");
        };
        let Stmt::Assign { rhs: Rhs::Run(run), .. } = &body[0] else {
            panic!("expected assignment from run");
        };
        assert_eq!(run.kind, RunKind::Agent);
        assert!(matches!(
            run.escalation.as_ref().unwrap().action,
            EscAction::Return(Some(_))
        ));
    }

    #[test]
    fn escalation_on_run_flow_is_rejected() {
        let err =
            parse_src("flow f do\n    run flow g on escalate abort\nend\n").unwrap_err();
        assert!(err.message.contains("run flow"));
    }

    #[test]
    fn if_else_and_nesting() {
        let unit = parse_src(
            "flow f do\n\
             \x20   if $x == 1 do\n\
             \x20       return 1\n\
             \x20   end\n\
             \x20   else do\n\
             \x20       return 2\n\
             \x20   end\n\
             end\n",
        )
        .unwrap();
        let Decl::Flow { body, .. } = &unit.decls[0] else {
            panic!("expected flow");
        };
        let Stmt::If { else_body, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(else_body.is_some());
    }

    #[test]
    fn match_with_arms_and_default() {
        let unit = parse_src(
            "flow f do\n\
             \x20   match $x do\n\
             \x20       case \"a\" do\n\
             \x20           return 1\n\
             \x20       end\n\
             \x20       else do\n\
             \x20           return 2\n\
             \x20       end\n\
             \x20   end\n\
             end\n",
        )
        .unwrap();
        let Decl::Flow { body, .. } = &unit.decls[0] else {
            panic!("expected flow");
        };
        let Stmt::Match { arms, default, .. } = &body[0] else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 1);
        assert!(default.is_some());
    }

    #[test]
    fn loop_bound_and_parallel() {
        let unit = parse_src(
            "flow f do\n\
             \x20   loop max 3 do\n\
             \x20       run agent a\n\
             \x20   end\n\
             \x20   parallel do\n\
             \x20       run agent a\n\
             \x20       call llm p\n\
             \x20   end\n\
             end\n",
        )
        .unwrap();
        let Decl::Flow { body, .. } = &unit.decls[0] else {
            panic!("expected flow");
        };
        assert!(matches!(&body[0], Stmt::Loop { max: Some((3, _)), .. }));
        assert!(matches!(&body[1], Stmt::Parallel { body, .. } if body.len() == 2));
    }

    #[test]
    fn comparison_is_non_associative() {
        assert!(parse_src("flow f do\n    $x = 1 == 2 == 3\nend\n").is_err());
    }

    #[test]
    fn using_model_accepts_string_or_ident() {
        let unit = parse_src(
            "prompt a\n    using model main\n    \"\"\"x\"\"\"\n\
             prompt b\n    using model \"main\"\n    \"\"\"y\"\"\"\n",
        )
        .unwrap();
        for decl in &unit.decls {
            let Decl::Prompt { clauses, .. } = decl else {
                panic!("expected prompt");
            };
            let PromptClause::UsingModel(m) = &clauses[0] else {
                panic!("expected using model");
            };
            assert_eq!(m.name, "main");
        }
    }
}
