//! Concrete syntax tree -- raw parser output prior to AST construction.
//!
//! Nodes mirror the grammar productions one-to-one and carry no
//! resolution or validation state. Trailing clauses (an `escalate if`
//! on a prompt, an `on escalate` on a run statement) are kept where the
//! grammar found them; attaching them to their owners is the AST
//! builder's job. The whole tree is transient and discarded after AST
//! construction.

use crate::diag::Span;

#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ──────────────────────────────────────────────
// Literals and expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum LitValue {
    Str(String),
    Int(i64),
    /// Kept as written to preserve the exact decimal representation.
    Float(String),
    Bool(bool),
    Null,
}

impl LitValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LitValue::Str(_) => "text",
            LitValue::Int(_) | LitValue::Float(_) => "number",
            LitValue::Bool(_) => "bool",
            LitValue::Null => "null",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Lit {
    pub value: LitValue,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BinOp {
    Or,
    And,
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `~` normalized equality (trimmed, case-insensitive)
    NormEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, serde::Serialize)]
pub enum Expr {
    Lit(Lit),
    /// Flow variable reference (name without the `$` sigil)
    Var {
        name: String,
        #[serde(skip)]
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },
    /// Property access, `base.field`
    Field {
        base: Box<Expr>,
        name: String,
        #[serde(skip)]
        span: Span,
    },
    /// Indexing, `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        #[serde(skip)]
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Lit(l) => l.span,
            Expr::Var { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Field { span, .. }
            | Expr::Index { span, .. } => *span,
        }
    }
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Decl {
    Import {
        path: String,
        span: Span,
    },
    Model {
        name: Ident,
        target: String,
        params: Vec<Prop>,
        span: Span,
    },
    Tool {
        name: Ident,
        binding: Option<String>,
        props: Vec<ToolProp>,
        span: Span,
    },
    Schema {
        name: Ident,
        fields: Vec<FieldDef>,
        span: Span,
    },
    Prompt {
        name: Ident,
        clauses: Vec<PromptClause>,
        body: Option<(String, Span)>,
        span: Span,
    },
    Agent {
        name: Ident,
        props: Vec<AgentProp>,
        span: Span,
    },
    /// `policy` / `retry` / `timeout` declaration forms.
    Policy {
        name: Ident,
        keyword: PolicyKeyword,
        props: Vec<Prop>,
        span: Span,
    },
    Handler {
        event: Ident,
        actions: Vec<Action>,
        span: Span,
    },
    Flow {
        name: Ident,
        body: Vec<Stmt>,
        span: Span,
    },
}

/// A generic `key value` property line inside a declaration block.
#[derive(Debug, Clone)]
pub struct Prop {
    pub key: Ident,
    pub value: PropValue,
}

#[derive(Debug, Clone)]
pub enum PropValue {
    Lit(Lit),
    /// A bare word, e.g. `backoff exponential`
    Word(Ident),
}

#[derive(Debug, Clone)]
pub enum ToolProp {
    Description(String, Span),
    Param {
        name: Ident,
        ty: TypeName,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: Ident,
    pub ty: TypeName,
    pub default: Option<Lit>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TypeName {
    Text(Span),
    Number(Span),
    Bool(Span),
    List(Box<TypeName>, Span),
    /// Named schema reference
    Named(Ident),
}

impl TypeName {
    pub fn span(&self) -> Span {
        match self {
            TypeName::Text(s) | TypeName::Number(s) | TypeName::Bool(s) | TypeName::List(_, s) => {
                *s
            }
            TypeName::Named(i) => i.span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PromptClause {
    /// `using model X` or `using model "X"` -- both are name references
    UsingModel(Ident),
    /// `expecting SchemaName`
    Expecting(Ident),
    /// `escalate if <cond>`
    EscalateIf(EscCond, Span),
}

/// Escalation condition as written: an operator applied to the prompt
/// output, or a full expression.
#[derive(Debug, Clone)]
pub enum EscCond {
    Normalized(Lit),
    Exact(Lit),
    NotEq(Lit),
    Contains(Lit),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum AgentProp {
    Description(String, Span),
    Instruction(Ident),
    Tools(Vec<Ident>, Span),
    Delegate(Vec<Ident>, Span),
    Use(Vec<Ident>, Span),
    Retry(Ident),
    Timeout(Ident),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKeyword {
    Policy,
    Retry,
    Timeout,
}

/// Guardrail action statement inside an `on <event>` handler body.
#[derive(Debug, Clone)]
pub enum Action {
    Block(Option<String>, Span),
    Redact(Span),
    Warn(String, Span),
    Allow(Span),
}

impl Action {
    pub fn span(&self) -> Span {
        match self {
            Action::Block(_, s) | Action::Redact(s) | Action::Warn(_, s) | Action::Allow(s) => *s,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Block(..) => "block",
            Action::Redact(_) => "redact",
            Action::Warn(..) => "warn",
            Action::Allow(_) => "allow",
        }
    }
}

// ──────────────────────────────────────────────
// Flow statements
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        var: Ident,
        rhs: Rhs,
        span: Span,
    },
    /// Standalone run statement (`run agent`, `run flow`, `call llm`)
    Run(RunStmt),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        default: Option<Vec<Stmt>>,
        span: Span,
    },
    Loop {
        max: Option<(u64, Span)>,
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

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Lit,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Rhs {
    Run(RunStmt),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RunKind {
    /// `run agent X` -- delegated sub-invocation
    Agent,
    /// `run flow X` -- nested flow routine
    Flow,
    /// `call llm X` -- single prompt invocation
    Llm,
}

#[derive(Debug, Clone)]
pub struct RunStmt {
    pub kind: RunKind,
    pub target: Ident,
    pub input: Option<Expr>,
    pub escalation: Option<EscHandler>,
    pub span: Span,
}

/// Trailing `on escalate return|continue|abort [expr]` clause.
#[derive(Debug, Clone)]
pub struct EscHandler {
    pub action: EscAction,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum EscAction {
    Return(Option<Expr>),
    Continue,
    Abort,
}
