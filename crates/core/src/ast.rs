//! Typed abstract syntax tree.
//!
//! Built from the CST by [`crate::build`]; immutable once constructed.
//! The semantic analyzer never mutates these nodes -- resolution and
//! scope results live in side tables keyed by [`RefId`]. Every node
//! keeps the span of the CST node it came from.

use crate::cst::{Action, Expr, Lit, LitValue, PolicyKeyword, RunKind};
use crate::diag::Span;
use crate::source::FileId;

/// Dense id assigned to every name-reference site by the builder.
/// The resolver's side table maps these to declaration handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefId(pub u32);

/// A reference to a declared name (model, tool, prompt, agent, flow,
/// schema or policy), before resolution.
#[derive(Debug, Clone)]
pub struct NameRef {
    pub name: String,
    pub span: Span,
    pub id: RefId,
}

/// One compiled file.
#[derive(Debug)]
pub struct Unit {
    pub file: FileId,
    pub decls: Vec<Decl>,
}

#[derive(Debug)]
pub enum Decl {
    Import(ImportDecl),
    Model(ModelDecl),
    Tool(ToolDecl),
    Schema(SchemaDecl),
    Prompt(PromptDecl),
    Agent(AgentDecl),
    Policy(PolicyDecl),
    Handler(HandlerDecl),
    Flow(FlowDecl),
}

impl Decl {
    /// Declared name, for everything that introduces one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Decl::Import(_) | Decl::Handler(_) => None,
            Decl::Model(d) => Some(&d.name),
            Decl::Tool(d) => Some(&d.name),
            Decl::Schema(d) => Some(&d.name),
            Decl::Prompt(d) => Some(&d.name),
            Decl::Agent(d) => Some(&d.name),
            Decl::Policy(d) => Some(&d.name),
            Decl::Flow(d) => Some(&d.name),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Decl::Import(d) => d.span,
            Decl::Model(d) => d.span,
            Decl::Tool(d) => d.span,
            Decl::Schema(d) => d.span,
            Decl::Prompt(d) => d.span,
            Decl::Agent(d) => d.span,
            Decl::Policy(d) => d.span,
            Decl::Handler(d) => d.span,
            Decl::Flow(d) => d.span,
        }
    }
}

#[derive(Debug)]
pub struct ImportDecl {
    pub path: String,
    pub span: Span,
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

#[derive(Debug)]
pub struct ModelDecl {
    pub name: String,
    pub name_span: Span,
    /// Provider model string, e.g. `"gpt-4.1"`.
    pub target: String,
    pub params: Vec<Param>,
    pub span: Span,
}

/// A `key value` parameter line (model params, policy props).
#[derive(Debug, Clone)]
pub struct Param {
    pub key: String,
    pub key_span: Span,
    pub value: ParamValue,
    pub value_span: Span,
}

#[derive(Debug, Clone)]
pub enum ParamValue {
    Lit(LitValue),
    /// Bare word, e.g. `backoff exponential`.
    Word(String),
}

#[derive(Debug)]
pub struct ToolDecl {
    pub name: String,
    pub name_span: Span,
    /// Runtime binding string, e.g. `"web.search"`.
    pub binding: Option<String>,
    pub description: Option<String>,
    pub params: Vec<ToolParam>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ToolParam {
    pub name: String,
    pub ty: FieldTy,
    pub span: Span,
}

#[derive(Debug)]
pub struct SchemaDecl {
    pub name: String,
    pub name_span: Span,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub ty: FieldTy,
    pub default: Option<Lit>,
    pub span: Span,
}

#[derive(Debug)]
pub enum FieldTy {
    Text,
    Number,
    Bool,
    List(Box<FieldTy>),
    /// Reference to another schema by name.
    Schema(NameRef),
}

impl FieldTy {
    pub fn display_name(&self) -> String {
        match self {
            FieldTy::Text => "text".into(),
            FieldTy::Number => "number".into(),
            FieldTy::Bool => "bool".into(),
            FieldTy::List(inner) => format!("list<{}>", inner.display_name()),
            FieldTy::Schema(r) => r.name.clone(),
        }
    }
}

#[derive(Debug)]
pub struct PromptDecl {
    pub name: String,
    pub name_span: Span,
    pub body: Option<String>,
    pub body_span: Option<Span>,
    /// `using model X` override.
    pub model: Option<NameRef>,
    /// `expecting Schema`.
    pub expecting: Option<NameRef>,
    /// `escalate if ...` clause, attached by the builder.
    pub escalation: Option<Escalation>,
    pub span: Span,
}

#[derive(Debug)]
pub struct Escalation {
    pub condition: EscalationCondition,
    pub span: Span,
}

/// Operator tag plus operand, per the declared `escalate if` form.
#[derive(Debug)]
pub enum EscalationCondition {
    /// `~ lit` -- trimmed, case-insensitive equality
    NormalizedEq(Lit),
    /// `== lit`
    ExactEq(Lit),
    /// `!= lit`
    NotEq(Lit),
    /// `contains lit`
    Contains(Lit),
    /// Arbitrary expression over the prompt output
    Expression(Expr),
}

#[derive(Debug)]
pub struct AgentDecl {
    pub name: String,
    pub name_span: Span,
    pub description: Option<String>,
    pub instruction: Option<NameRef>,
    pub tools: Vec<NameRef>,
    /// `delegate` composition: hand off entirely.
    pub delegates: Vec<NameRef>,
    /// `use` composition: invoke as a callable capability.
    pub uses: Vec<NameRef>,
    pub retry: Option<NameRef>,
    pub timeout: Option<NameRef>,
    pub span: Span,
}

#[derive(Debug)]
pub struct PolicyDecl {
    pub name: String,
    pub name_span: Span,
    pub keyword: PolicyKeyword,
    /// Raw value of a `kind` property on the generic `policy` form.
    pub kind_raw: Option<(String, Span)>,
    pub props: Vec<Param>,
    pub span: Span,
}

/// The two policy variants. No optional-field inference: a policy is
/// exactly one of these or it is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Retry,
    Timeout,
}

impl PolicyDecl {
    /// Kind implied by the declaration keyword, or by a recognized
    /// `kind` property on the generic `policy` form. `None` means the
    /// analyzer must report the declaration as invalid.
    pub fn effective_kind(&self) -> Option<PolicyKind> {
        match self.keyword {
            PolicyKeyword::Retry => Some(PolicyKind::Retry),
            PolicyKeyword::Timeout => Some(PolicyKind::Timeout),
            PolicyKeyword::Policy => match self.kind_raw.as_ref()?.0.as_str() {
                "retry" => Some(PolicyKind::Retry),
                "timeout" => Some(PolicyKind::Timeout),
                _ => None,
            },
        }
    }
}

#[derive(Debug)]
pub struct HandlerDecl {
    pub event: String,
    pub event_span: Span,
    pub actions: Vec<Action>,
    pub span: Span,
}

#[derive(Debug)]
pub struct FlowDecl {
    pub name: String,
    pub name_span: Span,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ──────────────────────────────────────────────
// Flow statements
// ──────────────────────────────────────────────

#[derive(Debug)]
pub enum Stmt {
    Assign {
        var: String,
        var_span: Span,
        rhs: Rhs,
        span: Span,
    },
    Run(RunStmt),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        span: Span,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        default: Option<Vec<Stmt>>,
        span: Span,
    },
    Loop {
        max: Option<u64>,
        body: Vec<Stmt>,
        span: Span,
    },
    Parallel {
        body: Vec<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Loop { span, .. }
            | Stmt::Parallel { span, .. }
            | Stmt::Return { span, .. } => *span,
            Stmt::Run(r) => r.span,
        }
    }
}

#[derive(Debug)]
pub struct MatchArm {
    pub pattern: Lit,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug)]
pub enum Rhs {
    Run(RunStmt),
    Expr(Expr),
}

#[derive(Debug)]
pub struct RunStmt {
    pub kind: RunKind,
    pub target: NameRef,
    pub input: Option<Expr>,
    pub escalation: Option<EscalationHandler>,
    pub span: Span,
}

/// Caller-side action taken when the callee's escalation condition
/// fires, attached to the owning run statement by the builder.
#[derive(Debug)]
pub struct EscalationHandler {
    pub action: EscalationAction,
    pub span: Span,
}

#[derive(Debug)]
pub enum EscalationAction {
    Return(Option<Expr>),
    Continue,
    Abort,
}
