//! The generated artifact: fully resolved declaration tables plus one
//! lowered routine per flow.
//!
//! The artifact is an immutable value, fully populated at generation
//! time and never mutated afterwards -- per-run state belongs to the
//! executing runtime, not here. Every cross-reference is a resolved
//! table index assigned during analysis; the runtime never performs a
//! string lookup that could fail.
//!
//! The execution contract encoded here is single-threaded and
//! cooperative: each flow routine yields a sequence of execution events
//! and one final result, and a nested `run_agent`/`run_flow`/`call_llm`
//! suspends the caller until the callee completes. [`Op::Sequential`]
//! (the lowering of a source `parallel` block) runs its members one
//! after another in source order.

use serde::Serialize;
use std::collections::BTreeMap;
use weave_core::cst::{Expr, LitValue};

/// Original-source position attached to every op and table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Serialize)]
pub struct Artifact {
    /// Root source file name.
    pub source: String,
    pub models: Vec<ModelEntry>,
    pub tools: Vec<ToolEntry>,
    pub schemas: Vec<SchemaEntry>,
    pub prompts: Vec<PromptEntry>,
    pub policies: Vec<PolicyEntry>,
    pub agents: Vec<AgentEntry>,
    pub handlers: Vec<HandlerEntry>,
    pub flows: Vec<FlowEntry>,
}

// ──────────────────────────────────────────────
// Declaration tables
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: String,
    /// Provider model string.
    pub target: String,
    pub params: BTreeMap<String, ParamLit>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Serialize)]
pub enum ParamLit {
    Lit(LitValue),
    Word(String),
}

#[derive(Debug, Serialize)]
pub struct ToolEntry {
    pub name: String,
    pub binding: Option<String>,
    pub description: Option<String>,
    pub params: Vec<ToolParamEntry>,
    pub origin: Origin,
}

#[derive(Debug, Serialize)]
pub struct ToolParamEntry {
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeInfo {
    Text,
    Number,
    Bool,
    List(Box<TypeInfo>),
    /// Resolved index into the schema table.
    Schema(u32),
}

#[derive(Debug, Serialize)]
pub struct SchemaEntry {
    pub name: String,
    pub fields: Vec<FieldEntry>,
    pub origin: Origin,
}

#[derive(Debug, Serialize)]
pub struct FieldEntry {
    pub name: String,
    pub ty: TypeInfo,
    pub default: Option<LitValue>,
}

#[derive(Debug, Serialize)]
pub struct PromptEntry {
    pub name: String,
    /// Opaque body text; `${...}` markers are preserved verbatim.
    pub body: String,
    /// Resolved model override, if declared.
    pub model: Option<u32>,
    /// Resolved expected schema, if declared.
    pub expecting: Option<u32>,
    pub escalation: Option<EscalationCond>,
    pub origin: Origin,
}

/// Escalation condition, operator tag per the declared form.
#[derive(Debug, Clone, Serialize)]
pub enum EscalationCond {
    NormalizedEq(LitValue),
    ExactEq(LitValue),
    NotEq(LitValue),
    Contains(LitValue),
    Expression(Expr),
}

#[derive(Debug, Serialize)]
pub struct PolicyEntry {
    pub name: String,
    pub config: PolicyConfig,
    pub origin: Origin,
}

/// One case per policy kind; each case holds only the fields that kind
/// needs, so an ambiguous policy is unrepresentable here.
#[derive(Debug, Clone, Serialize)]
pub enum PolicyConfig {
    Retry {
        max_attempts: i64,
        backoff: Backoff,
        delay: Option<LitValue>,
    },
    Timeout {
        seconds: LitValue,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Serialize)]
pub struct AgentEntry {
    pub name: String,
    pub description: Option<String>,
    /// Resolved instruction prompt index.
    pub instruction: u32,
    pub tools: Vec<u32>,
    pub delegates: Vec<u32>,
    pub uses: Vec<u32>,
    pub retry: Option<u32>,
    pub timeout: Option<u32>,
    pub origin: Origin,
}

#[derive(Debug, Serialize)]
pub struct HandlerEntry {
    pub event: String,
    pub actions: Vec<ActionEntry>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Serialize)]
pub enum ActionEntry {
    Block { reason: Option<String> },
    Redact,
    Warn { reason: String },
    Allow,
}

// ──────────────────────────────────────────────
// Flow routines
// ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FlowEntry {
    pub name: String,
    pub ops: Vec<Op>,
    pub origin: Origin,
}

/// Lowered flow operation. Structured tree rather than flat bytecode:
/// the renderer prints it deterministically and the runtime walks it.
#[derive(Debug, Serialize)]
pub enum Op {
    Assign {
        dest: String,
        value: Expr,
        origin: Origin,
    },
    /// Delegated sub-invocation: forwards the callee's execution events
    /// to the caller and captures exactly one final result.
    RunAgent {
        agent: u32,
        input: Option<Expr>,
        dest: Option<String>,
        escalation: Option<EscalationPlan>,
        origin: Origin,
    },
    RunFlow {
        flow: u32,
        input: Option<Expr>,
        dest: Option<String>,
        origin: Origin,
    },
    /// Single prompt invocation: one call event, one response event,
    /// no intermediate tool activity.
    CallLlm {
        prompt: u32,
        input: Option<Expr>,
        dest: Option<String>,
        escalation: Option<EscalationPlan>,
        origin: Origin,
    },
    Branch {
        cond: Expr,
        then_ops: Vec<Op>,
        else_ops: Vec<Op>,
        origin: Origin,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArmEntry>,
        default: Option<Vec<Op>>,
        origin: Origin,
    },
    /// Bounded iteration; `max: None` is permitted but flagged W0001
    /// during analysis.
    Loop {
        max: Option<u64>,
        body: Vec<Op>,
        origin: Origin,
    },
    /// Lowering of a source `parallel` block. Members execute strictly
    /// sequentially in source order; the name is deliberate so the
    /// artifact cannot imply concurrency.
    Sequential {
        members: Vec<Vec<Op>>,
        origin: Origin,
    },
    Return {
        value: Option<Expr>,
        origin: Origin,
    },
}

#[derive(Debug, Serialize)]
pub struct MatchArmEntry {
    pub pattern: LitValue,
    pub body: Vec<Op>,
    pub origin: Origin,
}

/// Guarded branch evaluated immediately after its run statement
/// completes. The flag tests the callee's escalation condition against
/// the produced result; `condition: None` (callee declares no
/// condition) never fires.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationPlan {
    pub condition: Option<EscalationCond>,
    pub action: EscalationAction,
    pub value: Option<Expr>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EscalationAction {
    Return,
    Continue,
    Abort,
}

impl Op {
    pub fn origin(&self) -> &Origin {
        match self {
            Op::Assign { origin, .. }
            | Op::RunAgent { origin, .. }
            | Op::RunFlow { origin, .. }
            | Op::CallLlm { origin, .. }
            | Op::Branch { origin, .. }
            | Op::Match { origin, .. }
            | Op::Loop { origin, .. }
            | Op::Sequential { origin, .. }
            | Op::Return { origin, .. } => origin,
        }
    }
}

/// Total op count, nested ops included. The generator checks the source
/// map covers at least this many positions before returning.
pub fn count_ops(artifact: &Artifact) -> usize {
    fn count(ops: &[Op]) -> usize {
        ops.iter()
            .map(|op| {
                1 + match op {
                    Op::Branch {
                        then_ops, else_ops, ..
                    } => count(then_ops) + count(else_ops),
                    Op::Match { arms, default, .. } => {
                        arms.iter().map(|a| count(&a.body)).sum::<usize>()
                            + default.as_ref().map(|d| count(d)).unwrap_or(0)
                    }
                    Op::Loop { body, .. } => count(body),
                    Op::Sequential { members, .. } => {
                        members.iter().map(|m| count(m)).sum::<usize>()
                    }
                    _ => 0,
                }
            })
            .sum()
    }
    artifact.flows.iter().map(|f| count(&f.ops)).sum()
}
