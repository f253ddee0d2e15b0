//! AST builder: concrete syntax tree -> typed AST.
//!
//! Purely structural, no validation -- malformed combinations (a
//! duplicate property, an unknown policy kind) survive into the AST and
//! are the semantic analyzer's to report. The mechanical work done here:
//! flattening property lists into struct fields (last occurrence wins),
//! attaching trailing `escalate if` clauses to the owning prompt,
//! attaching `on escalate` handlers to the owning run statement, and
//! assigning every name-reference site a dense [`RefId`].

use crate::ast;
use crate::cst;
use crate::source::FileId;

/// Allocator for [`ast::RefId`]s, shared across every file of one
/// compilation so ids stay unique in the resolver's side table.
#[derive(Default)]
pub struct RefIds {
    next: u32,
}

impl RefIds {
    pub fn new() -> Self {
        RefIds { next: 0 }
    }

    fn make(&mut self, ident: &cst::Ident) -> ast::NameRef {
        let id = ast::RefId(self.next);
        self.next += 1;
        ast::NameRef {
            name: ident.name.clone(),
            span: ident.span,
            id,
        }
    }
}

/// Build the typed AST for one parsed file.
pub fn build(unit: &cst::SourceUnit, file: FileId, refs: &mut RefIds) -> ast::Unit {
    let decls = unit.decls.iter().map(|d| build_decl(d, refs)).collect();
    ast::Unit { file, decls }
}

fn build_decl(decl: &cst::Decl, refs: &mut RefIds) -> ast::Decl {
    match decl {
        cst::Decl::Import { path, span } => ast::Decl::Import(ast::ImportDecl {
            path: path.clone(),
            span: *span,
        }),
        cst::Decl::Model {
            name,
            target,
            params,
            span,
        } => ast::Decl::Model(ast::ModelDecl {
            name: name.name.clone(),
            name_span: name.span,
            target: target.clone(),
            params: params.iter().map(build_param).collect(),
            span: *span,
        }),
        cst::Decl::Tool {
            name,
            binding,
            props,
            span,
        } => {
            let mut description = None;
            let mut params = Vec::new();
            for prop in props {
                match prop {
                    cst::ToolProp::Description(text, _) => description = Some(text.clone()),
                    cst::ToolProp::Param { name, ty, span } => params.push(ast::ToolParam {
                        name: name.name.clone(),
                        ty: build_ty(ty, refs),
                        span: *span,
                    }),
                }
            }
            ast::Decl::Tool(ast::ToolDecl {
                name: name.name.clone(),
                name_span: name.span,
                binding: binding.clone(),
                description,
                params,
                span: *span,
            })
        }
        cst::Decl::Schema { name, fields, span } => ast::Decl::Schema(ast::SchemaDecl {
            name: name.name.clone(),
            name_span: name.span,
            fields: fields
                .iter()
                .map(|f| ast::Field {
                    name: f.name.name.clone(),
                    ty: build_ty(&f.ty, refs),
                    default: f.default.clone(),
                    span: f.span,
                })
                .collect(),
            span: *span,
        }),
        cst::Decl::Prompt {
            name,
            clauses,
            body,
            span,
        } => {
            let mut model = None;
            let mut expecting = None;
            let mut escalation = None;
            for clause in clauses {
                match clause {
                    cst::PromptClause::UsingModel(ident) => model = Some(refs.make(ident)),
                    cst::PromptClause::Expecting(ident) => expecting = Some(refs.make(ident)),
                    cst::PromptClause::EscalateIf(cond, cspan) => {
                        escalation = Some(ast::Escalation {
                            condition: build_esc_cond(cond),
                            span: *cspan,
                        })
                    }
                }
            }
            ast::Decl::Prompt(ast::PromptDecl {
                name: name.name.clone(),
                name_span: name.span,
                body: body.as_ref().map(|(text, _)| text.clone()),
                body_span: body.as_ref().map(|(_, s)| *s),
                model,
                expecting,
                escalation,
                span: *span,
            })
        }
        cst::Decl::Agent { name, props, span } => {
            let mut agent = ast::AgentDecl {
                name: name.name.clone(),
                name_span: name.span,
                description: None,
                instruction: None,
                tools: Vec::new(),
                delegates: Vec::new(),
                uses: Vec::new(),
                retry: None,
                timeout: None,
                span: *span,
            };
            for prop in props {
                match prop {
                    cst::AgentProp::Description(text, _) => agent.description = Some(text.clone()),
                    cst::AgentProp::Instruction(ident) => {
                        agent.instruction = Some(refs.make(ident))
                    }
                    cst::AgentProp::Tools(names, _) => {
                        agent.tools.extend(names.iter().map(|i| refs.make(i)))
                    }
                    cst::AgentProp::Delegate(names, _) => {
                        agent.delegates.extend(names.iter().map(|i| refs.make(i)))
                    }
                    cst::AgentProp::Use(names, _) => {
                        agent.uses.extend(names.iter().map(|i| refs.make(i)))
                    }
                    cst::AgentProp::Retry(ident) => agent.retry = Some(refs.make(ident)),
                    cst::AgentProp::Timeout(ident) => agent.timeout = Some(refs.make(ident)),
                }
            }
            ast::Decl::Agent(agent)
        }
        cst::Decl::Policy {
            name,
            keyword,
            props,
            span,
        } => {
            // On the generic `policy` form the `kind` property selects
            // the variant; it is extracted here and interpreted by the
            // analyzer.
            let mut kind_raw = None;
            let mut rest = Vec::new();
            for prop in props {
                let is_kind = *keyword == cst::PolicyKeyword::Policy && prop.key.name == "kind";
                if is_kind {
                    let (text, span) = match &prop.value {
                        cst::PropValue::Word(w) => (w.name.clone(), w.span),
                        cst::PropValue::Lit(l) => (
                            match &l.value {
                                cst::LitValue::Str(s) => s.clone(),
                                other => other.kind_name().to_string(),
                            },
                            l.span,
                        ),
                    };
                    kind_raw = Some((text, span));
                } else {
                    rest.push(build_param(prop));
                }
            }
            ast::Decl::Policy(ast::PolicyDecl {
                name: name.name.clone(),
                name_span: name.span,
                keyword: *keyword,
                kind_raw,
                props: rest,
                span: *span,
            })
        }
        cst::Decl::Handler {
            event,
            actions,
            span,
        } => ast::Decl::Handler(ast::HandlerDecl {
            event: event.name.clone(),
            event_span: event.span,
            actions: actions.clone(),
            span: *span,
        }),
        cst::Decl::Flow { name, body, span } => ast::Decl::Flow(ast::FlowDecl {
            name: name.name.clone(),
            name_span: name.span,
            body: build_stmts(body, refs),
            span: *span,
        }),
    }
}

fn build_param(prop: &cst::Prop) -> ast::Param {
    let (value, value_span) = match &prop.value {
        cst::PropValue::Lit(l) => (ast::ParamValue::Lit(l.value.clone()), l.span),
        cst::PropValue::Word(w) => (ast::ParamValue::Word(w.name.clone()), w.span),
    };
    ast::Param {
        key: prop.key.name.clone(),
        key_span: prop.key.span,
        value,
        value_span,
    }
}

fn build_ty(ty: &cst::TypeName, refs: &mut RefIds) -> ast::FieldTy {
    match ty {
        cst::TypeName::Text(_) => ast::FieldTy::Text,
        cst::TypeName::Number(_) => ast::FieldTy::Number,
        cst::TypeName::Bool(_) => ast::FieldTy::Bool,
        cst::TypeName::List(inner, _) => ast::FieldTy::List(Box::new(build_ty(inner, refs))),
        cst::TypeName::Named(ident) => ast::FieldTy::Schema(refs.make(ident)),
    }
}

fn build_esc_cond(cond: &cst::EscCond) -> ast::EscalationCondition {
    match cond {
        cst::EscCond::Normalized(l) => ast::EscalationCondition::NormalizedEq(l.clone()),
        cst::EscCond::Exact(l) => ast::EscalationCondition::ExactEq(l.clone()),
        cst::EscCond::NotEq(l) => ast::EscalationCondition::NotEq(l.clone()),
        cst::EscCond::Contains(l) => ast::EscalationCondition::Contains(l.clone()),
        cst::EscCond::Expr(e) => ast::EscalationCondition::Expression(e.clone()),
    }
}

fn build_stmts(stmts: &[cst::Stmt], refs: &mut RefIds) -> Vec<ast::Stmt> {
    stmts.iter().map(|s| build_stmt(s, refs)).collect()
}

fn build_stmt(stmt: &cst::Stmt, refs: &mut RefIds) -> ast::Stmt {
    match stmt {
        cst::Stmt::Assign { var, rhs, span } => ast::Stmt::Assign {
            var: var.name.clone(),
            var_span: var.span,
            rhs: match rhs {
                cst::Rhs::Run(run) => ast::Rhs::Run(build_run(run, refs)),
                cst::Rhs::Expr(expr) => ast::Rhs::Expr(expr.clone()),
            },
            span: *span,
        },
        cst::Stmt::Run(run) => ast::Stmt::Run(build_run(run, refs)),
        cst::Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        } => ast::Stmt::If {
            cond: cond.clone(),
            then_body: build_stmts(then_body, refs),
            else_body: else_body
                .as_ref()
                .map(|b| build_stmts(b, refs))
                .unwrap_or_default(),
            span: *span,
        },
        cst::Stmt::Match {
            subject,
            arms,
            default,
            span,
        } => ast::Stmt::Match {
            subject: subject.clone(),
            arms: arms
                .iter()
                .map(|arm| ast::MatchArm {
                    pattern: arm.pattern.clone(),
                    body: build_stmts(&arm.body, refs),
                    span: arm.span,
                })
                .collect(),
            default: default.as_ref().map(|b| build_stmts(b, refs)),
            span: *span,
        },
        cst::Stmt::Loop { max, body, span } => ast::Stmt::Loop {
            max: max.map(|(n, _)| n),
            body: build_stmts(body, refs),
            span: *span,
        },
        cst::Stmt::Parallel { body, span } => ast::Stmt::Parallel {
            body: build_stmts(body, refs),
            span: *span,
        },
        cst::Stmt::Return { value, span } => ast::Stmt::Return {
            value: value.clone(),
            span: *span,
        },
    }
}

fn build_run(run: &cst::RunStmt, refs: &mut RefIds) -> ast::RunStmt {
    ast::RunStmt {
        kind: run.kind,
        target: refs.make(&run.target),
        input: run.input.clone(),
        escalation: run.escalation.as_ref().map(|h| ast::EscalationHandler {
            action: match &h.action {
                cst::EscAction::Return(v) => ast::EscalationAction::Return(v.clone()),
                cst::EscAction::Continue => ast::EscalationAction::Continue,
                cst::EscAction::Abort => ast::EscalationAction::Abort,
            },
            span: h.span,
        }),
        span: run.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn build_src(src: &str) -> ast::Unit {
        let (tokens, diags) = tokenize(src, FileId(0));
        assert!(diags.is_empty());
        let cst = parse(&tokens).expect("parse");
        build(&cst, FileId(0), &mut RefIds::new())
    }

    #[test]
    fn escalation_clause_attaches_to_prompt() {
        let unit = build_src(
            "prompt p\n    escalate if ~ \"DONE\"\n    \"\"\"body\"\"\"\n",
        );
        let ast::Decl::Prompt(p) = &unit.decls[0] else {
            panic!("expected prompt");
        };
        assert!(matches!(
            p.escalation.as_ref().unwrap().condition,
            ast::EscalationCondition::NormalizedEq(_)
        ));
        assert_eq!(p.body.as_deref(), Some("body"));
    }

    #[test]
    fn handler_attaches_to_run_statement() {
        let unit = build_src("flow f do\n    run agent a on escalate abort\nend\n");
        let ast::Decl::Flow(flow) = &unit.decls[0] else {
            panic!("expected flow");
        };
        let ast::Stmt::Run(run) = &flow.body[0] else {
            panic!("expected run");
        };
        assert!(matches!(
            run.escalation.as_ref().unwrap().action,
            ast::EscalationAction::Abort
        ));
    }

    #[test]
    fn ref_ids_are_dense_and_unique() {
        let unit = build_src(
            "agent a\n    instruction p\n    tools t1, t2\n    use b\n",
        );
        let ast::Decl::Agent(agent) = &unit.decls[0] else {
            panic!("expected agent");
        };
        let mut ids: Vec<u32> = Vec::new();
        ids.push(agent.instruction.as_ref().unwrap().id.0);
        ids.extend(agent.tools.iter().map(|r| r.id.0));
        ids.extend(agent.uses.iter().map(|r| r.id.0));
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn generic_policy_kind_is_extracted_raw() {
        let unit = build_src("policy p\n    kind retry\n    max_attempts 2\n");
        let ast::Decl::Policy(p) = &unit.decls[0] else {
            panic!("expected policy");
        };
        assert_eq!(p.kind_raw.as_ref().unwrap().0, "retry");
        assert_eq!(p.props.len(), 1);
        assert_eq!(p.props[0].key, "max_attempts");
    }
}
