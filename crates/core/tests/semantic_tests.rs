//! Integration tests for the front end and the six semantic passes.
//!
//! Each test feeds a small in-memory fixture through `check` (or
//! `analyze_source` when imports are involved) and asserts on the
//! structured diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;

use weave_core::diag::{exit_code, Code, Severity};
use weave_core::{check, CheckReport, InMemoryProvider};

fn codes(report: &CheckReport) -> Vec<Code> {
    report.diagnostics.iter().map(|d| d.code).collect()
}

const MINIMAL: &str = "model main = \"gpt-4.1\"\n\
                       prompt triage\n\
                       \x20   using model main\n\
                       \x20   \"\"\"Classify: ${ticket}\"\"\"\n\
                       agent support\n\
                       \x20   instruction triage\n";

// ──────────────────────────────────────────────
// Clean fixtures
// ──────────────────────────────────────────────

#[test]
fn minimal_valid_file_reports_no_errors() {
    let report = check(MINIMAL, "main.weave");
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.summary.describe(), "1 model, 1 agent");
    assert_eq!(exit_code(&report.diagnostics, false), 0);
}

#[test]
fn check_is_idempotent() {
    let src = "model main = \"x\"\nagent a\n"; // agent missing instruction
    let first = check(src, "main.weave");
    let second = check(src, "main.weave");
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(
        exit_code(&first.diagnostics, false),
        exit_code(&second.diagnostics, false)
    );
}

// ──────────────────────────────────────────────
// Pass 1 -- duplicates
// ──────────────────────────────────────────────

#[test]
fn duplicate_model_is_one_e0003_and_first_stays_resolvable() {
    let report = check(
        "model main = \"a\"\n\
         model main = \"b\"\n\
         prompt p\n\
         \x20   using model main\n\
         \x20   \"\"\"x\"\"\"\n",
        "main.weave",
    );
    // Exactly one E0003 and no E0001: the first declaration resolves.
    assert_eq!(codes(&report), vec![Code::E0003]);
    assert_eq!(report.diagnostics[0].span.line, 2);
    assert_eq!(report.summary.models, 1);
}

#[test]
fn namespace_is_shared_across_kinds() {
    let report = check(
        "model shared = \"x\"\ntool shared = \"y\"\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0003]);
}

// ──────────────────────────────────────────────
// Pass 2 -- reference resolution
// ──────────────────────────────────────────────

#[test]
fn undefined_model_reference_lists_defined_models() {
    let report = check(
        "model main = \"gpt-4.1\"\n\
         prompt p\n\
         \x20   using model \"missing\"\n\
         \x20   \"\"\"x\"\"\"\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0001]);
    let diag = &report.diagnostics[0];
    assert!(diag.message.contains("missing"), "{}", diag.message);
    assert_eq!(diag.help.as_deref(), Some("defined models are: main"));
    assert_eq!(diag.span.line, 3);
}

#[test]
fn wrong_kind_reference_is_e0001() {
    let report = check(
        "model m = \"x\"\nagent a\n    instruction m\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0001]);
    assert!(report.diagnostics[0]
        .message
        .contains("'m' is a model, but a prompt is required"));
}

#[test]
fn run_targets_resolve_by_kind() {
    let report = check(
        &format!("{}flow f do\n    run agent support\n    call llm triage\nend\n", MINIMAL),
        "main.weave",
    );
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.summary.flows, 1);
}

// ──────────────────────────────────────────────
// Pass 3 -- variable scope
// ──────────────────────────────────────────────

#[test]
fn variable_used_before_assignment_is_e0002() {
    let report = check(
        &format!("{}flow f do\n    $y = $x + 1\n    $x = 2\nend\n", MINIMAL),
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0002]);
    assert!(report.diagnostics[0].message.contains("$x"));
}

#[test]
fn scope_is_flat_across_nested_blocks() {
    // A binding inside an if-branch is visible after the block.
    let report = check(
        &format!(
            "{}flow f do\n\
             \x20   if 1 == 1 do\n\
             \x20       $a = 1\n\
             \x20   end\n\
             \x20   return $a\n\
             end\n",
            MINIMAL
        ),
        "main.weave",
    );
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn run_destination_is_bound_for_its_own_escalation_handler() {
    let report = check(
        &format!(
            "{}flow f do\n    $t = run agent support on escalate return $t\nend\n",
            MINIMAL
        ),
        "main.weave",
    );
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

#[test]
fn escalation_handler_reading_unbound_variable_is_e0002() {
    let report = check(
        &format!(
            "{}flow f do\n    run agent support on escalate return $nope\nend\n",
            MINIMAL
        ),
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0002]);
}

// ──────────────────────────────────────────────
// Pass 4 -- structural invariants
// ──────────────────────────────────────────────

#[test]
fn agent_without_instruction_is_e0010() {
    let report = check("agent a\n    description \"x\"\n", "main.weave");
    assert_eq!(codes(&report), vec![Code::E0010]);
    assert!(report.diagnostics[0].message.contains("instruction"));
}

#[test]
fn generic_policy_without_kind_is_e0010() {
    let report = check("policy p\n    max_attempts 3\n", "main.weave");
    assert_eq!(codes(&report), vec![Code::E0010]);
    assert!(report.diagnostics[0].message.contains("kind"));
}

#[test]
fn retry_policy_property_type_mismatch_is_e0004() {
    let report = check(
        "retry r\n    max_attempts \"three\"\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0004]);
}

#[test]
fn schema_default_type_mismatch_is_e0004() {
    let report = check(
        "schema Report\n    field title: text = 3\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0004]);
    assert!(report.diagnostics[0].message.contains("title"));
}

#[test]
fn normalized_escalation_on_non_text_literal_is_e0004() {
    let report = check(
        "prompt p\n    escalate if ~ 42\n    \"\"\"x\"\"\"\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0004]);
}

#[test]
fn block_outside_content_event_is_e0009() {
    let report = check(
        "on session_start do\n    block\nend\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0009]);
    assert!(report.diagnostics[0]
        .message
        .contains("not permitted in 'on session_start'"));
}

#[test]
fn unknown_handler_event_is_e0009_with_help() {
    let report = check("on frobnicate do\n    allow\nend\n", "main.weave");
    assert_eq!(codes(&report), vec![Code::E0009]);
    assert!(report.diagnostics[0]
        .help
        .as_deref()
        .unwrap()
        .contains("input"));
}

#[test]
fn agent_retry_must_reference_a_retry_policy() {
    let report = check(
        &format!(
            "{}timeout slow\n    seconds 30\nagent a2\n    instruction triage\n    retry slow\n",
            MINIMAL
        ),
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0004]);
}

// ──────────────────────────────────────────────
// Pass 5 -- cycles
// ──────────────────────────────────────────────

#[test]
fn agent_cycle_is_one_e0011_naming_the_path() {
    let report = check(
        "prompt p\n    \"\"\"x\"\"\"\n\
         agent a\n    instruction p\n    use b\n\
         agent b\n    instruction p\n    use a\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0011]);
    assert!(report.diagnostics[0]
        .message
        .contains("a -> b -> a"));
}

#[test]
fn self_delegation_is_a_cycle() {
    let report = check(
        "prompt p\n    \"\"\"x\"\"\"\nagent a\n    instruction p\n    delegate a\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::E0011]);
    assert!(report.diagnostics[0].message.contains("a -> a"));
}

#[test]
fn acyclic_delegation_is_clean() {
    let report = check(
        "prompt p\n    \"\"\"x\"\"\"\n\
         agent a\n    instruction p\n    delegate b\n\
         agent b\n    instruction p\n",
        "main.weave",
    );
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
}

// ──────────────────────────────────────────────
// Imports (loader + pass 5)
// ──────────────────────────────────────────────

#[test]
fn single_source_import_is_e0005() {
    let report = check("import \"lib.weave\"\n", "main.weave");
    assert_eq!(codes(&report), vec![Code::E0005]);
}

#[test]
fn circular_import_is_e0006() {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("b.weave"),
        "import \"a.weave\"\nmodel mb = \"x\"\n".to_string(),
    );
    let provider = InMemoryProvider::new(files);
    let (analysis, _sources) = weave_core::analyze_source(
        "a.weave",
        "import \"b.weave\"\nmodel ma = \"x\"\n",
        &provider,
    );
    let codes: Vec<Code> = analysis.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![Code::E0006]);
    assert!(analysis.diagnostics[0]
        .message
        .contains("a.weave -> b.weave -> a.weave"));
}

#[test]
fn imported_declarations_resolve() {
    let mut files = HashMap::new();
    files.insert(
        PathBuf::from("lib.weave"),
        "model shared = \"gpt-4.1\"\n".to_string(),
    );
    let provider = InMemoryProvider::new(files);
    let (analysis, _sources) = weave_core::analyze_source(
        "main.weave",
        "import \"lib.weave\"\nprompt p\n    using model shared\n    \"\"\"x\"\"\"\n",
        &provider,
    );
    assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
}

// ──────────────────────────────────────────────
// Pass 6 -- warnings
// ──────────────────────────────────────────────

#[test]
fn unbounded_loop_is_w0001_and_does_not_fail() {
    let report = check(
        &format!("{}flow f do\n    loop do\n        return\n    end\nend\n", MINIMAL),
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::W0001]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
    assert!(report.is_valid());
    assert_eq!(exit_code(&report.diagnostics, false), 0);
    assert_eq!(exit_code(&report.diagnostics, true), 1);
}

#[test]
fn delegate_plus_use_is_w0002() {
    let report = check(
        "prompt p\n    \"\"\"x\"\"\"\n\
         agent a\n    instruction p\n    delegate b\n    use c\n\
         agent b\n    instruction p\n\
         agent c\n    instruction p\n",
        "main.weave",
    );
    assert_eq!(codes(&report), vec![Code::W0002]);
    assert_eq!(report.diagnostics[0].severity, Severity::Warning);
    assert!(report.is_valid());
}

// ──────────────────────────────────────────────
// Lexical recovery
// ──────────────────────────────────────────────

#[test]
fn bad_indentation_reports_exact_position_and_recovers() {
    let report = check(
        "agent a\n    instruction p\n  tools t\n",
        "main.weave",
    );
    let e0008: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.code == Code::E0008)
        .collect();
    assert_eq!(e0008.len(), 1);
    assert_eq!(e0008[0].span.line, 3);
    assert_eq!(e0008[0].span.col, 3);
    // Recovery keeps the cascade small.
    assert!(report.diagnostics.len() <= 3, "{:?}", report.diagnostics);
}

#[test]
fn invalid_character_does_not_suppress_later_diagnostics() {
    // The stray '%' is E0007; the undefined model is still found.
    let report = check(
        "model main = \"x\" %\n\
         prompt p\n\
         \x20   using model \"missing\"\n\
         \x20   \"\"\"x\"\"\"\n",
        "main.weave",
    );
    let codes = codes(&report);
    assert!(codes.contains(&Code::E0007));
    assert!(codes.contains(&Code::E0001));
}
