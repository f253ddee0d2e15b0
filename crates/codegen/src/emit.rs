//! Deterministic renderer for the artifact listing.
//!
//! `generate` and `dump` share this one renderer, so the positions the
//! source map records always agree with what `dump` prints. Lines come
//! in two kinds: executable listing lines (kept in every dump mode) and
//! pure source-position annotation lines (prefix `;`), which
//! `dump(.., false)` omits while preserving executable lines verbatim.

use crate::artifact::*;
use weave_core::cst::{BinOp, Expr, LitValue, UnOp};

/// One rendered listing line.
pub struct Line {
    pub text: String,
    /// Pure source-position annotation, omitted by `dump(.., false)`.
    pub annotation: bool,
    /// Original position for source-map entries; `None` for structural
    /// lines (headers, closing braces).
    pub origin: Option<Origin>,
}

pub struct Listing {
    pub lines: Vec<Line>,
}

/// Render the canonical listing. Deterministic: same artifact, same
/// bytes.
pub fn render(artifact: &Artifact) -> Listing {
    let mut r = Renderer { lines: Vec::new() };
    r.header(artifact);
    r.tables(artifact);
    for (i, flow) in artifact.flows.iter().enumerate() {
        r.flow(i, flow);
    }
    Listing { lines: r.lines }
}

/// Artifact listing as text. With `include_source_comments` the
/// per-statement `;` position annotations are kept; without it they are
/// omitted and all executable lines appear verbatim.
pub fn dump(artifact: &Artifact, include_source_comments: bool) -> String {
    let mut out = String::new();
    for line in render(artifact).lines {
        if line.annotation && !include_source_comments {
            continue;
        }
        out.push_str(&line.text);
        out.push('\n');
    }
    out
}

struct Renderer {
    lines: Vec<Line>,
}

impl Renderer {
    fn structural(&mut self, text: String) {
        self.lines.push(Line {
            text,
            annotation: false,
            origin: None,
        });
    }

    fn annotation(&mut self, indent: usize, origin: &Origin) {
        self.lines.push(Line {
            text: format!(
                "{}; {}:{}:{}",
                "  ".repeat(indent),
                origin.file,
                origin.line,
                origin.col
            ),
            annotation: true,
            origin: None,
        });
    }

    fn executable(&mut self, indent: usize, text: String, origin: &Origin) {
        self.lines.push(Line {
            text: format!("{}{}", "  ".repeat(indent), text),
            annotation: false,
            origin: Some(origin.clone()),
        });
    }

    fn header(&mut self, artifact: &Artifact) {
        self.lines.push(Line {
            text: "; weave artifact v1".into(),
            annotation: true,
            origin: None,
        });
        self.lines.push(Line {
            text: format!("; source: {}", artifact.source),
            annotation: true,
            origin: None,
        });
    }

    fn tables(&mut self, artifact: &Artifact) {
        for (i, m) in artifact.models.iter().enumerate() {
            let params = if m.params.is_empty() {
                String::new()
            } else {
                let parts: Vec<String> = m
                    .params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, param_text(v)))
                    .collect();
                format!(" {{{}}}", parts.join(", "))
            };
            self.executable(
                0,
                format!("model @m{} \"{}\" = \"{}\"{}", i, m.name, m.target, params),
                &m.origin,
            );
        }
        for (i, t) in artifact.tools.iter().enumerate() {
            let binding = t
                .binding
                .as_ref()
                .map(|b| format!(" = \"{}\"", b))
                .unwrap_or_default();
            let params = if t.params.is_empty() {
                String::new()
            } else {
                let parts: Vec<String> = t
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, type_text(&p.ty)))
                    .collect();
                format!(" {{{}}}", parts.join(", "))
            };
            self.executable(
                0,
                format!("tool @t{} \"{}\"{}{}", i, t.name, binding, params),
                &t.origin,
            );
        }
        for (i, s) in artifact.schemas.iter().enumerate() {
            let fields: Vec<String> = s
                .fields
                .iter()
                .map(|f| {
                    let default = f
                        .default
                        .as_ref()
                        .map(|d| format!(" = {}", lit_text(d)))
                        .unwrap_or_default();
                    format!("{}: {}{}", f.name, type_text(&f.ty), default)
                })
                .collect();
            self.executable(
                0,
                format!("schema @s{} \"{}\" {{{}}}", i, s.name, fields.join(", ")),
                &s.origin,
            );
        }
        for (i, p) in artifact.prompts.iter().enumerate() {
            let mut parts = vec![format!("prompt @pr{} \"{}\"", i, p.name)];
            if let Some(m) = p.model {
                parts.push(format!("model=@m{}", m));
            }
            if let Some(s) = p.expecting {
                parts.push(format!("expecting=@s{}", s));
            }
            if let Some(cond) = &p.escalation {
                parts.push(format!("escalate=({})", cond_text(cond)));
            }
            let lines = p.body.lines().count().max(1);
            parts.push(format!("body=<{} line{}>", lines, if lines == 1 { "" } else { "s" }));
            self.executable(0, parts.join(" "), &p.origin);
        }
        for (i, p) in artifact.policies.iter().enumerate() {
            let config = match &p.config {
                PolicyConfig::Retry {
                    max_attempts,
                    backoff,
                    delay,
                } => {
                    let mut parts = vec![format!("max_attempts={}", max_attempts)];
                    parts.push(format!(
                        "backoff={}",
                        match backoff {
                            Backoff::Fixed => "fixed",
                            Backoff::Exponential => "exponential",
                        }
                    ));
                    if let Some(d) = delay {
                        parts.push(format!("delay={}", lit_text(d)));
                    }
                    format!("retry {{{}}}", parts.join(", "))
                }
                PolicyConfig::Timeout { seconds } => {
                    format!("timeout {{seconds={}}}", lit_text(seconds))
                }
            };
            self.executable(
                0,
                format!("policy @p{} \"{}\" {}", i, p.name, config),
                &p.origin,
            );
        }
        for (i, a) in artifact.agents.iter().enumerate() {
            let mut parts = vec![format!(
                "agent @a{} \"{}\" instruction=@pr{}",
                i, a.name, a.instruction
            )];
            if !a.tools.is_empty() {
                parts.push(format!("tools=[{}]", ref_list("@t", &a.tools)));
            }
            if !a.delegates.is_empty() {
                parts.push(format!("delegates=[{}]", ref_list("@a", &a.delegates)));
            }
            if !a.uses.is_empty() {
                parts.push(format!("uses=[{}]", ref_list("@a", &a.uses)));
            }
            if let Some(r) = a.retry {
                parts.push(format!("retry=@p{}", r));
            }
            if let Some(t) = a.timeout {
                parts.push(format!("timeout=@p{}", t));
            }
            self.executable(0, parts.join(" "), &a.origin);
        }
        for (i, h) in artifact.handlers.iter().enumerate() {
            let actions: Vec<String> = h.actions.iter().map(action_text).collect();
            self.executable(
                0,
                format!("handler @h{} on {} {{{}}}", i, h.event, actions.join(", ")),
                &h.origin,
            );
        }
    }

    fn flow(&mut self, index: usize, flow: &FlowEntry) {
        self.annotation(0, &flow.origin);
        self.structural(format!("flow @f{} \"{}\" {{", index, flow.name));
        self.ops(1, &flow.ops);
        self.structural("}".into());
    }

    fn ops(&mut self, indent: usize, ops: &[Op]) {
        for op in ops {
            self.op(indent, op);
        }
    }

    fn op(&mut self, indent: usize, op: &Op) {
        self.annotation(indent, op.origin());
        match op {
            Op::Assign { dest, value, origin } => {
                self.executable(indent, format!("${} = {}", dest, expr_text(value)), origin);
            }
            Op::RunAgent {
                agent,
                input,
                dest,
                escalation,
                origin,
            } => {
                self.run_line(indent, &format!("run_agent @a{}", agent), input, dest, origin);
                self.escalation(indent, escalation);
            }
            Op::RunFlow {
                flow,
                input,
                dest,
                origin,
            } => {
                self.run_line(indent, &format!("run_flow @f{}", flow), input, dest, origin);
            }
            Op::CallLlm {
                prompt,
                input,
                dest,
                escalation,
                origin,
            } => {
                self.run_line(indent, &format!("call_llm @pr{}", prompt), input, dest, origin);
                self.escalation(indent, escalation);
            }
            Op::Branch {
                cond,
                then_ops,
                else_ops,
                origin,
            } => {
                self.executable(indent, format!("branch {} {{", expr_text(cond)), origin);
                self.ops(indent + 1, then_ops);
                if else_ops.is_empty() {
                    self.structural(format!("{}}}", "  ".repeat(indent)));
                } else {
                    self.structural(format!("{}}} else {{", "  ".repeat(indent)));
                    self.ops(indent + 1, else_ops);
                    self.structural(format!("{}}}", "  ".repeat(indent)));
                }
            }
            Op::Match {
                subject,
                arms,
                default,
                origin,
            } => {
                self.executable(indent, format!("match {} {{", expr_text(subject)), origin);
                for arm in arms {
                    self.executable(
                        indent + 1,
                        format!("case {} {{", lit_text(&arm.pattern)),
                        &arm.origin,
                    );
                    self.ops(indent + 2, &arm.body);
                    self.structural(format!("{}}}", "  ".repeat(indent + 1)));
                }
                if let Some(body) = default {
                    self.structural(format!("{}else {{", "  ".repeat(indent + 1)));
                    self.ops(indent + 2, body);
                    self.structural(format!("{}}}", "  ".repeat(indent + 1)));
                }
                self.structural(format!("{}}}", "  ".repeat(indent)));
            }
            Op::Loop { max, body, origin } => {
                let bound = match max {
                    Some(n) => format!("max={}", n),
                    None => "unbounded".into(),
                };
                self.executable(indent, format!("loop {} {{", bound), origin);
                self.ops(indent + 1, body);
                self.structural(format!("{}}}", "  ".repeat(indent)));
            }
            Op::Sequential { members, origin } => {
                // Deliberately not "parallel": members run one after
                // another, in source order.
                self.executable(indent, "sequential {".into(), origin);
                for member in members {
                    self.structural(format!("{}step {{", "  ".repeat(indent + 1)));
                    self.ops(indent + 2, member);
                    self.structural(format!("{}}}", "  ".repeat(indent + 1)));
                }
                self.structural(format!("{}}}", "  ".repeat(indent)));
            }
            Op::Return { value, origin } => {
                let text = match value {
                    Some(v) => format!("return {}", expr_text(v)),
                    None => "return".into(),
                };
                self.executable(indent, text, origin);
            }
        }
    }

    fn run_line(
        &mut self,
        indent: usize,
        call: &str,
        input: &Option<Expr>,
        dest: &Option<String>,
        origin: &Origin,
    ) {
        let mut text = String::new();
        if let Some(dest) = dest {
            text.push_str(&format!("${} = ", dest));
        }
        text.push_str(call);
        if let Some(input) = input {
            text.push_str(&format!(" with {}", expr_text(input)));
        }
        self.executable(indent, text, origin);
    }

    /// The guarded branch evaluated immediately after the run statement
    /// completes.
    fn escalation(&mut self, indent: usize, plan: &Option<EscalationPlan>) {
        let Some(plan) = plan else { return };
        self.annotation(indent, &plan.origin);
        let cond = match &plan.condition {
            Some(cond) => cond_text(cond),
            None => "never".into(),
        };
        let action = match plan.action {
            EscalationAction::Return => match &plan.value {
                Some(v) => format!("return {}", expr_text(v)),
                None => "return".into(),
            },
            EscalationAction::Continue => "continue".into(),
            EscalationAction::Abort => "abort".into(),
        };
        self.executable(
            indent,
            format!("on_escalation ({}) {}", cond, action),
            &plan.origin,
        );
    }
}

// ──────────────────────────────────────────────
// Text fragments
// ──────────────────────────────────────────────

fn ref_list(prefix: &str, indices: &[u32]) -> String {
    indices
        .iter()
        .map(|i| format!("{}{}", prefix, i))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn lit_text(lit: &LitValue) -> String {
    match lit {
        LitValue::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        LitValue::Int(n) => n.to_string(),
        LitValue::Float(f) => f.clone(),
        LitValue::Bool(b) => b.to_string(),
        LitValue::Null => "null".into(),
    }
}

pub fn cond_text(cond: &EscalationCond) -> String {
    match cond {
        EscalationCond::NormalizedEq(lit) => format!("~ {}", lit_text(lit)),
        EscalationCond::ExactEq(lit) => format!("== {}", lit_text(lit)),
        EscalationCond::NotEq(lit) => format!("!= {}", lit_text(lit)),
        EscalationCond::Contains(lit) => format!("contains {}", lit_text(lit)),
        EscalationCond::Expression(expr) => format!("expr {}", expr_text(expr)),
    }
}

fn type_text(ty: &TypeInfo) -> String {
    match ty {
        TypeInfo::Text => "text".into(),
        TypeInfo::Number => "number".into(),
        TypeInfo::Bool => "bool".into(),
        TypeInfo::List(inner) => format!("list<{}>", type_text(inner)),
        TypeInfo::Schema(i) => format!("@s{}", i),
    }
}

fn param_text(param: &ParamLit) -> String {
    match param {
        ParamLit::Lit(lit) => lit_text(lit),
        ParamLit::Word(w) => w.clone(),
    }
}

fn action_text(action: &ActionEntry) -> String {
    match action {
        ActionEntry::Block { reason: None } => "block".into(),
        ActionEntry::Block {
            reason: Some(reason),
        } => format!("block(\"{}\")", reason),
        ActionEntry::Redact => "redact".into(),
        ActionEntry::Warn { reason } => format!("warn(\"{}\")", reason),
        ActionEntry::Allow => "allow".into(),
    }
}

pub fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Lit(lit) => lit_text(&lit.value),
        Expr::Var { name, .. } => format!("${}", name),
        Expr::Unary { op, expr, .. } => match op {
            UnOp::Not => format!("not {}", expr_text(expr)),
            UnOp::Neg => format!("-{}", expr_text(expr)),
        },
        Expr::Binary { op, lhs, rhs, .. } => {
            format!("({} {} {})", expr_text(lhs), binop_text(*op), expr_text(rhs))
        }
        Expr::Field { base, name, .. } => format!("{}.{}", expr_text(base), name),
        Expr::Index { base, index, .. } => {
            format!("{}[{}]", expr_text(base), expr_text(index))
        }
    }
}

fn binop_text(op: BinOp) -> &'static str {
    match op {
        BinOp::Or => "or",
        BinOp::And => "and",
        BinOp::Eq => "==",
        BinOp::Neq => "!=",
        BinOp::NormEq => "~",
        BinOp::Lt => "<",
        BinOp::Lte => "<=",
        BinOp::Gt => ">",
        BinOp::Gte => ">=",
        BinOp::Contains => "contains",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}
