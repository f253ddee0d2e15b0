//! Integration tests for lowering, the artifact listing and the source
//! map, driven through the public `compile` entry point.

use weave_codegen::artifact::{EscalationAction, EscalationCond, Op, PolicyConfig};
use weave_codegen::{compile, dump};
use weave_core::cst::LitValue;

const FIXTURE: &str = "\
model main = \"gpt-4.1\"
    temperature 0.2

schema Report
    field title: text
    field score: number = 0

prompt triage
    using model main
    expecting Report
    escalate if ~ \"DONE\"
    \"\"\"
    Classify the ticket: ${ticket}
    \"\"\"

retry default_retry
    max_attempts 3
    backoff exponential

agent support
    description \"Front line\"
    instruction triage
    retry default_retry

flow main_flow do
    $ticket = \"latest\"
    $t = run agent support with $ticket on escalate return $t
    $r = call llm triage
    if $r.score >= 3 do
        return $r
    end
    parallel do
        run agent support
        call llm triage
    end
    loop max 3 do
        $t = run agent support
    end
    return $t
end
";

fn compile_fixture() -> weave_codegen::CompileResult {
    let result = compile(FIXTURE, "main.weave");
    assert!(
        result.diagnostics.iter().all(|d| !d.is_error()),
        "unexpected errors: {:?}",
        result.diagnostics
    );
    assert!(result.artifact.is_some());
    result
}

// ──────────────────────────────────────────────
// Table resolution
// ──────────────────────────────────────────────

#[test]
fn references_lower_to_table_indices() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();

    assert_eq!(artifact.models.len(), 1);
    assert_eq!(artifact.prompts.len(), 1);
    assert_eq!(artifact.agents.len(), 1);
    assert_eq!(artifact.policies.len(), 1);

    let prompt = &artifact.prompts[0];
    assert_eq!(prompt.model, Some(0));
    assert_eq!(prompt.expecting, Some(0));
    assert!(prompt.body.contains("${ticket}"));

    let agent = &artifact.agents[0];
    assert_eq!(agent.instruction, 0);
    assert_eq!(agent.retry, Some(0));
    match &artifact.policies[0].config {
        PolicyConfig::Retry {
            max_attempts,
            backoff,
            ..
        } => {
            assert_eq!(*max_attempts, 3);
            assert_eq!(format!("{:?}", backoff), "Exponential");
        }
        other => panic!("expected retry config, got {:?}", other),
    }
}

// ──────────────────────────────────────────────
// Escalation lowering
// ──────────────────────────────────────────────

#[test]
fn escalation_handler_lowers_to_guarded_branch() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();
    let flow = &artifact.flows[0];

    let Op::RunAgent { escalation, dest, .. } = &flow.ops[1] else {
        panic!("expected run_agent op, got {:?}", flow.ops[1]);
    };
    assert_eq!(dest.as_deref(), Some("t"));
    let plan = escalation.as_ref().expect("escalation plan");
    // The guard carries the callee's normalized-equality condition.
    match plan.condition.as_ref().expect("condition") {
        EscalationCond::NormalizedEq(LitValue::Str(s)) => assert_eq!(s, "DONE"),
        other => panic!("expected normalized-eq condition, got {:?}", other),
    }
    assert_eq!(plan.action, EscalationAction::Return);
    assert!(plan.value.is_some());

    // And the rendering makes the guarded branch visible.
    let listing = dump(&artifact, false);
    assert!(
        listing.contains("on_escalation (~ \"DONE\") return $t"),
        "{}",
        listing
    );
}

#[test]
fn call_llm_inherits_prompt_condition() {
    let result = compile(
        "model m = \"x\"\n\
         prompt p\n\
         \x20   using model m\n\
         \x20   escalate if contains \"STOP\"\n\
         \x20   \"\"\"x\"\"\"\n\
         flow f do\n\
         \x20   $r = call llm p on escalate abort\n\
         end\n",
        "main.weave",
    );
    let artifact = result.artifact.expect("artifact");
    let Op::CallLlm { escalation, .. } = &artifact.flows[0].ops[0] else {
        panic!("expected call_llm op");
    };
    let plan = escalation.as_ref().unwrap();
    assert!(matches!(
        plan.condition,
        Some(EscalationCond::Contains(LitValue::Str(_)))
    ));
    assert_eq!(plan.action, EscalationAction::Abort);
}

// ──────────────────────────────────────────────
// Parallel lowering
// ──────────────────────────────────────────────

#[test]
fn parallel_lowers_to_sequential_members_in_source_order() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();
    let flow = &artifact.flows[0];

    let Op::Sequential { members, .. } = &flow.ops[4] else {
        panic!("expected sequential op, got {:?}", flow.ops[4]);
    };
    assert_eq!(members.len(), 2);
    assert!(matches!(members[0][0], Op::RunAgent { .. }));
    assert!(matches!(members[1][0], Op::CallLlm { .. }));

    // Nothing in the artifact or its rendering claims concurrency.
    let listing = dump(&artifact, true);
    assert!(listing.contains("sequential {"));
    assert!(!listing.contains("parallel"));
}

// ──────────────────────────────────────────────
// Determinism
// ──────────────────────────────────────────────

#[test]
fn repeated_compiles_are_byte_identical() {
    let a = compile(FIXTURE, "main.weave");
    let b = compile(FIXTURE, "main.weave");
    let json_a = serde_json::to_string(&a.artifact.unwrap()).unwrap();
    let json_b = serde_json::to_string(&b.artifact.unwrap()).unwrap();
    assert_eq!(json_a, json_b);
    assert_eq!(a.diagnostics, b.diagnostics);
    assert_eq!(a.source_map.entries(), b.source_map.entries());
}

// ──────────────────────────────────────────────
// Source map
// ──────────────────────────────────────────────

#[test]
fn every_mapping_stays_within_the_original_file() {
    let result = compile_fixture();
    let line_count = FIXTURE.lines().count() as u32;
    assert!(!result.source_map.is_empty());
    for entry in result.source_map.entries() {
        assert_eq!(entry.file, "main.weave");
        assert!(entry.line >= 1 && entry.line <= line_count, "{:?}", entry);
    }
}

#[test]
fn mappings_point_at_listing_lines() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();
    let listing = dump(&artifact, true);
    let lines: Vec<&str> = listing.lines().collect();
    for entry in result.source_map.entries() {
        let line = lines[(entry.generated_line - 1) as usize];
        assert!(
            !line.trim_start().starts_with(';'),
            "mapping points at annotation line: {}",
            line
        );
    }
}

#[test]
fn translate_round_trips_the_run_statement() {
    let result = compile_fixture();
    let artifact = result.artifact.as_ref().unwrap();
    let listing = dump(artifact, true);

    // Find the generated line holding the run_agent op.
    let gline = listing
        .lines()
        .position(|l| l.contains("run_agent @a0 with $ticket"))
        .expect("run_agent line") as u32
        + 1;
    let pos = result.source_map.translate(gline, 3).expect("translation");
    assert_eq!(pos.file, "main.weave");
    let original = FIXTURE.lines().nth(pos.line as usize - 1).unwrap();
    assert!(original.contains("run agent support"), "{}", original);
}

#[test]
fn translate_unknown_position_is_none() {
    let result = compile_fixture();
    assert!(result.source_map.translate(100_000, 1).is_none());
}

// ──────────────────────────────────────────────
// Dump modes
// ──────────────────────────────────────────────

#[test]
fn dump_without_comments_drops_only_annotation_lines() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();
    let full = dump(&artifact, true);
    let bare = dump(&artifact, false);

    assert!(bare.lines().all(|l| !l.trim_start().starts_with(';')));
    let expected: Vec<&str> = full
        .lines()
        .filter(|l| !l.trim_start().starts_with(';'))
        .collect();
    let actual: Vec<&str> = bare.lines().collect();
    // Executable lines are preserved verbatim, in order.
    assert_eq!(expected, actual);
}

#[test]
fn dump_with_comments_annotates_statements() {
    let result = compile_fixture();
    let artifact = result.artifact.unwrap();
    let full = dump(&artifact, true);
    assert!(full.contains("; main.weave:"));
    assert!(full.lines().next().unwrap().contains("weave artifact"));
}

// ──────────────────────────────────────────────
// Failure gating
// ──────────────────────────────────────────────

#[test]
fn errors_suppress_the_artifact() {
    let result = compile("agent a\n", "main.weave");
    assert!(result.artifact.is_none());
    assert!(!result.diagnostics.is_empty());
    assert!(result.source_map.is_empty());
}

#[test]
fn warnings_do_not_suppress_the_artifact() {
    let result = compile(
        "model m = \"x\"\n\
         prompt p\n\
         \x20   using model m\n\
         \x20   \"\"\"x\"\"\"\n\
         flow f do\n\
         \x20   loop do\n\
         \x20       return\n\
         \x20   end\n\
         end\n",
        "main.weave",
    );
    assert!(result.artifact.is_some());
    assert_eq!(result.diagnostics.len(), 1);
    assert!(!result.diagnostics[0].is_error());
    let listing = dump(&result.artifact.unwrap(), false);
    assert!(listing.contains("loop unbounded {"), "{}", listing);
}
