//! Lowering: validated AST -> artifact + source map.
//!
//! Runs only when analysis produced zero error-severity diagnostics;
//! everything unresolved or structurally invalid was reported before
//! this point, so an inconsistency observed here is a compiler bug and
//! panics rather than producing a diagnostic.
//!
//! Lowering rules:
//! - `run agent X` -> a delegated sub-invocation op that forwards the
//!   callee's execution events and captures one final result
//! - `call llm P` -> a single prompt invocation op
//! - `loop max N` -> a bounded loop op; unbounded stays unbounded
//!   (already flagged W0001 by analysis)
//! - `parallel` -> [`Op::Sequential`], members in source order
//! - `on escalate ...` -> an [`EscalationPlan`] carrying the callee's
//!   resolved escalation condition, rendered as a guarded branch
//!   immediately after the owning run op

use std::collections::BTreeMap;

use weave_core::ast;
use weave_core::cst::RunKind;
use weave_core::diag::Span;
use weave_core::source::SourceSet;
use weave_core::Analysis;

use crate::artifact::*;
use crate::emit;
use crate::sourcemap::{SourceMap, SourceMapping};

/// Lower a validated analysis into the artifact and its source map.
///
/// Panics when called with error diagnostics present, or when an
/// internal invariant (resolved references, mapping coverage, mapping
/// bounds) does not hold -- those are compiler bugs, not user errors.
pub fn generate(analysis: &Analysis, sources: &SourceSet) -> (Artifact, SourceMap) {
    if analysis.has_errors() {
        panic!("compiler bug: generate() called with error diagnostics present");
    }
    let lower = Lower { analysis, sources };
    let artifact = lower.artifact();
    let map = build_source_map(&artifact, sources);
    (artifact, map)
}

struct Lower<'a> {
    analysis: &'a Analysis,
    sources: &'a SourceSet,
}

impl<'a> Lower<'a> {
    fn origin(&self, span: Span) -> Origin {
        Origin {
            file: self.sources.name(span.file).to_owned(),
            line: span.line,
            col: span.col,
        }
    }

    /// Resolved table index for a reference site.
    fn handle(&self, site: &ast::NameRef) -> u32 {
        match self.analysis.resolved.get(&site.id) {
            Some(symbol) => symbol.index,
            None => panic!(
                "compiler bug: unresolved reference '{}' survived analysis",
                site.name
            ),
        }
    }

    fn canonical(&self, name: &str, name_span: Span) -> bool {
        self.analysis.symbols.is_canonical(name, name_span)
    }

    fn artifact(&self) -> Artifact {
        let mut artifact = Artifact {
            source: self.sources.name(weave_core::FileId(0)).to_owned(),
            models: Vec::new(),
            tools: Vec::new(),
            schemas: Vec::new(),
            prompts: Vec::new(),
            policies: Vec::new(),
            agents: Vec::new(),
            handlers: Vec::new(),
            flows: Vec::new(),
        };

        // Declaration tables first, in symbol-index order; flows last so
        // run targets can consult completed tables.
        for unit in &self.analysis.units {
            for decl in &unit.decls {
                match decl {
                    ast::Decl::Model(m) if self.canonical(&m.name, m.name_span) => {
                        artifact.models.push(self.model(m));
                    }
                    ast::Decl::Tool(t) if self.canonical(&t.name, t.name_span) => {
                        artifact.tools.push(self.tool(t));
                    }
                    ast::Decl::Schema(s) if self.canonical(&s.name, s.name_span) => {
                        artifact.schemas.push(self.schema(s));
                    }
                    ast::Decl::Prompt(p) if self.canonical(&p.name, p.name_span) => {
                        artifact.prompts.push(self.prompt(p));
                    }
                    ast::Decl::Policy(p) if self.canonical(&p.name, p.name_span) => {
                        artifact.policies.push(self.policy(p));
                    }
                    ast::Decl::Agent(a) if self.canonical(&a.name, a.name_span) => {
                        artifact.agents.push(self.agent(a));
                    }
                    ast::Decl::Handler(h) => {
                        artifact.handlers.push(self.handler(h));
                    }
                    _ => {}
                }
            }
        }
        for unit in &self.analysis.units {
            for decl in &unit.decls {
                if let ast::Decl::Flow(f) = decl {
                    if self.canonical(&f.name, f.name_span) {
                        let entry = self.flow(f, &artifact);
                        artifact.flows.push(entry);
                    }
                }
            }
        }
        artifact
    }

    fn model(&self, decl: &ast::ModelDecl) -> ModelEntry {
        let mut params = BTreeMap::new();
        for param in &decl.params {
            let value = match &param.value {
                ast::ParamValue::Lit(lit) => ParamLit::Lit(lit.clone()),
                ast::ParamValue::Word(word) => ParamLit::Word(word.clone()),
            };
            params.insert(param.key.clone(), value);
        }
        ModelEntry {
            name: decl.name.clone(),
            target: decl.target.clone(),
            params,
            origin: self.origin(decl.name_span),
        }
    }

    fn tool(&self, decl: &ast::ToolDecl) -> ToolEntry {
        ToolEntry {
            name: decl.name.clone(),
            binding: decl.binding.clone(),
            description: decl.description.clone(),
            params: decl
                .params
                .iter()
                .map(|p| ToolParamEntry {
                    name: p.name.clone(),
                    ty: self.type_info(&p.ty),
                })
                .collect(),
            origin: self.origin(decl.name_span),
        }
    }

    fn schema(&self, decl: &ast::SchemaDecl) -> SchemaEntry {
        SchemaEntry {
            name: decl.name.clone(),
            fields: decl
                .fields
                .iter()
                .map(|f| FieldEntry {
                    name: f.name.clone(),
                    ty: self.type_info(&f.ty),
                    default: f.default.as_ref().map(|d| d.value.clone()),
                })
                .collect(),
            origin: self.origin(decl.name_span),
        }
    }

    fn type_info(&self, ty: &ast::FieldTy) -> TypeInfo {
        match ty {
            ast::FieldTy::Text => TypeInfo::Text,
            ast::FieldTy::Number => TypeInfo::Number,
            ast::FieldTy::Bool => TypeInfo::Bool,
            ast::FieldTy::List(inner) => TypeInfo::List(Box::new(self.type_info(inner))),
            ast::FieldTy::Schema(site) => TypeInfo::Schema(self.handle(site)),
        }
    }

    fn prompt(&self, decl: &ast::PromptDecl) -> PromptEntry {
        PromptEntry {
            name: decl.name.clone(),
            body: decl.body.clone().unwrap_or_else(|| {
                panic!(
                    "compiler bug: prompt '{}' without body survived analysis",
                    decl.name
                )
            }),
            model: decl.model.as_ref().map(|site| self.handle(site)),
            expecting: decl.expecting.as_ref().map(|site| self.handle(site)),
            escalation: decl.escalation.as_ref().map(|e| self.cond(&e.condition)),
            origin: self.origin(decl.name_span),
        }
    }

    fn cond(&self, cond: &ast::EscalationCondition) -> EscalationCond {
        match cond {
            ast::EscalationCondition::NormalizedEq(l) => {
                EscalationCond::NormalizedEq(l.value.clone())
            }
            ast::EscalationCondition::ExactEq(l) => EscalationCond::ExactEq(l.value.clone()),
            ast::EscalationCondition::NotEq(l) => EscalationCond::NotEq(l.value.clone()),
            ast::EscalationCondition::Contains(l) => EscalationCond::Contains(l.value.clone()),
            ast::EscalationCondition::Expression(e) => EscalationCond::Expression(e.clone()),
        }
    }

    fn policy(&self, decl: &ast::PolicyDecl) -> PolicyEntry {
        let find = |key: &str| decl.props.iter().find(|p| p.key == key);
        let config = match decl.effective_kind() {
            Some(ast::PolicyKind::Retry) => {
                let max_attempts = match find("max_attempts").map(|p| &p.value) {
                    Some(ast::ParamValue::Lit(weave_core::cst::LitValue::Int(n))) => *n,
                    _ => panic!(
                        "compiler bug: retry policy '{}' without max_attempts survived analysis",
                        decl.name
                    ),
                };
                let backoff = match find("backoff").map(|p| &p.value) {
                    Some(ast::ParamValue::Word(w)) if w == "exponential" => Backoff::Exponential,
                    _ => Backoff::Fixed,
                };
                let delay = match find("delay").map(|p| &p.value) {
                    Some(ast::ParamValue::Lit(lit)) => Some(lit.clone()),
                    _ => None,
                };
                PolicyConfig::Retry {
                    max_attempts,
                    backoff,
                    delay,
                }
            }
            Some(ast::PolicyKind::Timeout) => {
                let seconds = match find("seconds").map(|p| &p.value) {
                    Some(ast::ParamValue::Lit(lit)) => lit.clone(),
                    _ => panic!(
                        "compiler bug: timeout policy '{}' without seconds survived analysis",
                        decl.name
                    ),
                };
                PolicyConfig::Timeout { seconds }
            }
            None => panic!(
                "compiler bug: policy '{}' with no kind survived analysis",
                decl.name
            ),
        };
        PolicyEntry {
            name: decl.name.clone(),
            config,
            origin: self.origin(decl.name_span),
        }
    }

    fn agent(&self, decl: &ast::AgentDecl) -> AgentEntry {
        let instruction = decl.instruction.as_ref().unwrap_or_else(|| {
            panic!(
                "compiler bug: agent '{}' without instruction survived analysis",
                decl.name
            )
        });
        AgentEntry {
            name: decl.name.clone(),
            description: decl.description.clone(),
            instruction: self.handle(instruction),
            tools: decl.tools.iter().map(|s| self.handle(s)).collect(),
            delegates: decl.delegates.iter().map(|s| self.handle(s)).collect(),
            uses: decl.uses.iter().map(|s| self.handle(s)).collect(),
            retry: decl.retry.as_ref().map(|s| self.handle(s)),
            timeout: decl.timeout.as_ref().map(|s| self.handle(s)),
            origin: self.origin(decl.name_span),
        }
    }

    fn handler(&self, decl: &ast::HandlerDecl) -> HandlerEntry {
        use weave_core::cst::Action;
        HandlerEntry {
            event: decl.event.clone(),
            actions: decl
                .actions
                .iter()
                .map(|a| match a {
                    Action::Block(reason, _) => ActionEntry::Block {
                        reason: reason.clone(),
                    },
                    Action::Redact(_) => ActionEntry::Redact,
                    Action::Warn(reason, _) => ActionEntry::Warn {
                        reason: reason.clone(),
                    },
                    Action::Allow(_) => ActionEntry::Allow,
                })
                .collect(),
            origin: self.origin(decl.event_span),
        }
    }

    fn flow(&self, decl: &ast::FlowDecl, artifact: &Artifact) -> FlowEntry {
        FlowEntry {
            name: decl.name.clone(),
            ops: self.stmts(&decl.body, artifact),
            origin: self.origin(decl.name_span),
        }
    }

    fn stmts(&self, stmts: &[ast::Stmt], artifact: &Artifact) -> Vec<Op> {
        stmts.iter().map(|s| self.stmt(s, artifact)).collect()
    }

    fn stmt(&self, stmt: &ast::Stmt, artifact: &Artifact) -> Op {
        match stmt {
            ast::Stmt::Assign { var, rhs, span, .. } => match rhs {
                ast::Rhs::Expr(expr) => Op::Assign {
                    dest: var.clone(),
                    value: expr.clone(),
                    origin: self.origin(*span),
                },
                ast::Rhs::Run(run) => self.run(run, Some(var.clone()), *span, artifact),
            },
            ast::Stmt::Run(run) => self.run(run, None, run.span, artifact),
            ast::Stmt::If {
                cond,
                then_body,
                else_body,
                span,
            } => Op::Branch {
                cond: cond.clone(),
                then_ops: self.stmts(then_body, artifact),
                else_ops: self.stmts(else_body, artifact),
                origin: self.origin(*span),
            },
            ast::Stmt::Match {
                subject,
                arms,
                default,
                span,
            } => Op::Match {
                subject: subject.clone(),
                arms: arms
                    .iter()
                    .map(|arm| MatchArmEntry {
                        pattern: arm.pattern.value.clone(),
                        body: self.stmts(&arm.body, artifact),
                        origin: self.origin(arm.span),
                    })
                    .collect(),
                default: default.as_ref().map(|body| self.stmts(body, artifact)),
                origin: self.origin(*span),
            },
            ast::Stmt::Loop { max, body, span } => Op::Loop {
                max: *max,
                body: self.stmts(body, artifact),
                origin: self.origin(*span),
            },
            // `parallel` lowers to strictly sequential execution of its
            // members in source order.
            ast::Stmt::Parallel { body, span } => Op::Sequential {
                members: body
                    .iter()
                    .map(|member| vec![self.stmt(member, artifact)])
                    .collect(),
                origin: self.origin(*span),
            },
            ast::Stmt::Return { value, span } => Op::Return {
                value: value.clone(),
                origin: self.origin(*span),
            },
        }
    }

    fn run(
        &self,
        run: &ast::RunStmt,
        dest: Option<String>,
        span: Span,
        artifact: &Artifact,
    ) -> Op {
        let origin = self.origin(span);
        let index = self.handle(&run.target);
        match run.kind {
            RunKind::Agent => {
                // The escalation condition comes from the agent's
                // instruction prompt.
                let condition = artifact
                    .prompts
                    .get(artifact.agents[index as usize].instruction as usize)
                    .and_then(|p| p.escalation.clone());
                Op::RunAgent {
                    agent: index,
                    input: run.input.clone(),
                    dest,
                    escalation: self.plan(run, condition),
                    origin,
                }
            }
            RunKind::Llm => {
                let condition = artifact.prompts[index as usize].escalation.clone();
                Op::CallLlm {
                    prompt: index,
                    input: run.input.clone(),
                    dest,
                    escalation: self.plan(run, condition),
                    origin,
                }
            }
            RunKind::Flow => Op::RunFlow {
                flow: index,
                input: run.input.clone(),
                dest,
                origin,
            },
        }
    }

    fn plan(
        &self,
        run: &ast::RunStmt,
        condition: Option<EscalationCond>,
    ) -> Option<EscalationPlan> {
        let handler = run.escalation.as_ref()?;
        let (action, value) = match &handler.action {
            ast::EscalationAction::Return(value) => (EscalationAction::Return, value.clone()),
            ast::EscalationAction::Continue => (EscalationAction::Continue, None),
            ast::EscalationAction::Abort => (EscalationAction::Abort, None),
        };
        Some(EscalationPlan {
            condition,
            action,
            value,
            origin: self.origin(handler.span),
        })
    }
}

// ──────────────────────────────────────────────
// Source map construction
// ──────────────────────────────────────────────

/// Build the mapping table off the canonical listing and enforce the
/// coverage and bounds invariants.
fn build_source_map(artifact: &Artifact, sources: &SourceSet) -> SourceMap {
    let listing = emit::render(artifact);
    let mut map = SourceMap::new();
    for (i, line) in listing.lines.iter().enumerate() {
        let Some(origin) = &line.origin else { continue };
        let indent = line.text.len() - line.text.trim_start().len();
        map.push(SourceMapping {
            generated_line: i as u32 + 1,
            generated_col: indent as u32 + 1,
            file: origin.file.clone(),
            line: origin.line,
            col: origin.col,
        });
    }

    // Invariant: every emitted statement has a mapping. Table entries
    // and ops each emit exactly one mapped line (escalation guards add
    // more), so coverage below this floor is a generator bug.
    let floor = count_ops(artifact)
        + artifact.models.len()
        + artifact.tools.len()
        + artifact.schemas.len()
        + artifact.prompts.len()
        + artifact.policies.len()
        + artifact.agents.len()
        + artifact.handlers.len();
    if map.len() < floor {
        panic!(
            "compiler bug: {} statements emitted but only {} source mappings recorded",
            floor,
            map.len()
        );
    }

    // Invariant: every original position lies inside its source file.
    for entry in map.entries() {
        let in_bounds = sources
            .lookup(&entry.file)
            .map(|id| entry.line >= 1 && entry.line <= sources.line_count(id))
            .unwrap_or(false);
        if !in_bounds {
            panic!(
                "compiler bug: source mapping {}:{} is outside the original file",
                entry.file, entry.line
            );
        }
    }
    map
}
