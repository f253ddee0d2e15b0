//! Pass 4: structural invariants.
//!
//! Required-property checks (`E0010`), guardrail action/context checks
//! (`E0009`) and literal type checks (`E0004`). Everything here is
//! local-recoverable: each finding is recorded and the walk continues.

use std::collections::HashMap;

use crate::ast;
use crate::cst::{Action, LitValue};
use crate::diag::{Code, Diagnostic, Span};
use crate::symbols::{DeclKind, Symbol, SymbolTable};

const HANDLER_EVENTS: [&str; 5] = [
    "input",
    "output",
    "tool_call",
    "session_start",
    "session_end",
];

/// Events during which there is content to block or redact.
const CONTENT_EVENTS: [&str; 3] = ["input", "output", "tool_call"];

pub fn run(
    units: &[ast::Unit],
    symbols: &SymbolTable,
    resolved: &HashMap<ast::RefId, Symbol>,
    diags: &mut Vec<Diagnostic>,
) {
    // Canonical policy declarations in table order, for kind checks on
    // agent retry/timeout references.
    let mut policies: Vec<&ast::PolicyDecl> = Vec::new();
    for unit in units {
        for decl in &unit.decls {
            if let ast::Decl::Policy(p) = decl {
                if symbols.is_canonical(&p.name, p.name_span) {
                    policies.push(p);
                }
            }
        }
    }

    for unit in units {
        for decl in &unit.decls {
            match decl {
                ast::Decl::Import(_) | ast::Decl::Tool(_) | ast::Decl::Flow(_) => {}
                ast::Decl::Model(model) => check_model(model, diags),
                ast::Decl::Schema(schema) => check_schema(schema, diags),
                ast::Decl::Prompt(prompt) => check_prompt(prompt, diags),
                ast::Decl::Agent(agent) => check_agent(agent, resolved, &policies, diags),
                ast::Decl::Policy(policy) => check_policy(policy, diags),
                ast::Decl::Handler(handler) => check_handler(handler, diags),
            }
        }
    }
}

fn mismatch(span: Span, message: String) -> Diagnostic {
    Diagnostic::new(Code::E0004, span, message)
}

fn check_model(model: &ast::ModelDecl, diags: &mut Vec<Diagnostic>) {
    for param in &model.params {
        match param.key.as_str() {
            "temperature" => {
                if !is_number(&param.value) {
                    diags.push(mismatch(
                        param.value_span,
                        format!(
                            "model parameter 'temperature' expects a number, got {}",
                            param_kind(&param.value)
                        ),
                    ));
                }
            }
            "max_tokens" => {
                if !matches!(param.value, ast::ParamValue::Lit(LitValue::Int(_))) {
                    diags.push(mismatch(
                        param.value_span,
                        format!(
                            "model parameter 'max_tokens' expects an integer, got {}",
                            param_kind(&param.value)
                        ),
                    ));
                }
            }
            _ => {}
        }
    }
}

fn check_schema(schema: &ast::SchemaDecl, diags: &mut Vec<Diagnostic>) {
    for field in &schema.fields {
        let Some(default) = &field.default else {
            continue;
        };
        if matches!(default.value, LitValue::Null) {
            continue;
        }
        let ok = match &field.ty {
            ast::FieldTy::Text => matches!(default.value, LitValue::Str(_)),
            ast::FieldTy::Number => {
                matches!(default.value, LitValue::Int(_) | LitValue::Float(_))
            }
            ast::FieldTy::Bool => matches!(default.value, LitValue::Bool(_)),
            ast::FieldTy::List(_) | ast::FieldTy::Schema(_) => false,
        };
        if !ok {
            diags.push(mismatch(
                default.span,
                format!(
                    "field '{}' has type {} but its default is {}",
                    field.name,
                    field.ty.display_name(),
                    default.value.kind_name()
                ),
            ));
        }
    }
}

fn check_prompt(prompt: &ast::PromptDecl, diags: &mut Vec<Diagnostic>) {
    if prompt.body.is_none() {
        diags.push(Diagnostic::new(
            Code::E0010,
            prompt.name_span,
            format!("prompt '{}' is missing a body", prompt.name),
        ));
    }
    if let Some(escalation) = &prompt.escalation {
        let (op, lit) = match &escalation.condition {
            ast::EscalationCondition::NormalizedEq(lit) => ("~", Some(lit)),
            ast::EscalationCondition::Contains(lit) => ("contains", Some(lit)),
            _ => ("", None),
        };
        if let Some(lit) = lit {
            if !matches!(lit.value, LitValue::Str(_)) {
                diags.push(mismatch(
                    lit.span,
                    format!(
                        "escalation operator '{}' compares text, got {}",
                        op,
                        lit.value.kind_name()
                    ),
                ));
            }
        }
    }
}

fn check_agent(
    agent: &ast::AgentDecl,
    resolved: &HashMap<ast::RefId, Symbol>,
    policies: &[&ast::PolicyDecl],
    diags: &mut Vec<Diagnostic>,
) {
    if agent.instruction.is_none() {
        diags.push(Diagnostic::new(
            Code::E0010,
            agent.name_span,
            format!(
                "agent '{}' is missing required property 'instruction'",
                agent.name
            ),
        ));
    }
    check_policy_ref(&agent.retry, ast::PolicyKind::Retry, "retry", resolved, policies, diags);
    check_policy_ref(
        &agent.timeout,
        ast::PolicyKind::Timeout,
        "timeout",
        resolved,
        policies,
        diags,
    );
}

/// An agent's `retry` must reference a retry policy, `timeout` a
/// timeout policy. Unresolved references were already reported by
/// pass 2 and are skipped here.
fn check_policy_ref(
    site: &Option<ast::NameRef>,
    want: ast::PolicyKind,
    prop: &str,
    resolved: &HashMap<ast::RefId, Symbol>,
    policies: &[&ast::PolicyDecl],
    diags: &mut Vec<Diagnostic>,
) {
    let Some(site) = site else { return };
    let Some(symbol) = resolved.get(&site.id) else {
        return;
    };
    if symbol.kind != DeclKind::Policy {
        return;
    }
    let Some(policy) = policies.get(symbol.index as usize) else {
        return;
    };
    match policy.effective_kind() {
        Some(kind) if kind == want => {}
        // An invalid policy declaration gets its own E0010/E0004; do
        // not pile a second diagnostic on the reference.
        None => {}
        Some(_) => {
            diags.push(mismatch(
                site.span,
                format!(
                    "agent property '{}' must reference a {} policy; '{}' is a {} policy",
                    prop,
                    prop,
                    site.name,
                    match policy.effective_kind() {
                        Some(ast::PolicyKind::Retry) => "retry",
                        _ => "timeout",
                    }
                ),
            ));
        }
    }
}

fn check_policy(policy: &ast::PolicyDecl, diags: &mut Vec<Diagnostic>) {
    use crate::cst::PolicyKeyword;
    let kind = match policy.effective_kind() {
        Some(kind) => kind,
        None => {
            match (&policy.kind_raw, policy.keyword) {
                (Some((raw, span)), _) => diags.push(mismatch(
                    *span,
                    format!(
                        "unknown policy kind '{}'; expected 'retry' or 'timeout'",
                        raw
                    ),
                )),
                (None, PolicyKeyword::Policy) => diags.push(Diagnostic::new(
                    Code::E0010,
                    policy.name_span,
                    format!(
                        "policy '{}' is missing required property 'kind'",
                        policy.name
                    ),
                )),
                _ => {}
            }
            return;
        }
    };

    let find = |key: &str| policy.props.iter().find(|p| p.key == key);
    match kind {
        ast::PolicyKind::Retry => {
            match find("max_attempts") {
                None => diags.push(Diagnostic::new(
                    Code::E0010,
                    policy.name_span,
                    format!(
                        "retry policy '{}' is missing required property 'max_attempts'",
                        policy.name
                    ),
                )),
                Some(param) => {
                    if !matches!(param.value, ast::ParamValue::Lit(LitValue::Int(_))) {
                        diags.push(mismatch(
                            param.value_span,
                            format!(
                                "'max_attempts' expects an integer, got {}",
                                param_kind(&param.value)
                            ),
                        ));
                    }
                }
            }
            if let Some(param) = find("backoff") {
                let ok = matches!(
                    &param.value,
                    ast::ParamValue::Word(w) if w == "fixed" || w == "exponential"
                );
                if !ok {
                    diags.push(mismatch(
                        param.value_span,
                        "'backoff' expects 'fixed' or 'exponential'".to_string(),
                    ));
                }
            }
            if let Some(param) = find("delay") {
                if !is_number(&param.value) {
                    diags.push(mismatch(
                        param.value_span,
                        format!("'delay' expects a number, got {}", param_kind(&param.value)),
                    ));
                }
            }
        }
        ast::PolicyKind::Timeout => match find("seconds") {
            None => diags.push(Diagnostic::new(
                Code::E0010,
                policy.name_span,
                format!(
                    "timeout policy '{}' is missing required property 'seconds'",
                    policy.name
                ),
            )),
            Some(param) => {
                if !is_number(&param.value) {
                    diags.push(mismatch(
                        param.value_span,
                        format!(
                            "'seconds' expects a number, got {}",
                            param_kind(&param.value)
                        ),
                    ));
                }
            }
        },
    }
}

fn check_handler(handler: &ast::HandlerDecl, diags: &mut Vec<Diagnostic>) {
    if !HANDLER_EVENTS.contains(&handler.event.as_str()) {
        diags.push(
            Diagnostic::new(
                Code::E0009,
                handler.event_span,
                format!("unknown handler event '{}'", handler.event),
            )
            .with_help(format!("valid events are: {}", HANDLER_EVENTS.join(", "))),
        );
        return;
    }
    let content_event = CONTENT_EVENTS.contains(&handler.event.as_str());
    for action in &handler.actions {
        let needs_content = matches!(action, Action::Block(..) | Action::Redact(_));
        if needs_content && !content_event {
            diags.push(
                Diagnostic::new(
                    Code::E0009,
                    action.span(),
                    format!(
                        "guardrail action '{}' is not permitted in 'on {}'",
                        action.name(),
                        handler.event
                    ),
                )
                .with_help(format!(
                    "'{}' applies to content-bearing events: {}",
                    action.name(),
                    CONTENT_EVENTS.join(", ")
                )),
            );
        }
    }
}

fn is_number(value: &ast::ParamValue) -> bool {
    matches!(
        value,
        ast::ParamValue::Lit(LitValue::Int(_)) | ast::ParamValue::Lit(LitValue::Float(_))
    )
}

fn param_kind(value: &ast::ParamValue) -> &'static str {
    match value {
        ast::ParamValue::Lit(lit) => lit.kind_name(),
        ast::ParamValue::Word(_) => "a bare word",
    }
}
