//! CLI integration tests for the `weave` binary.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout
//! content and stderr content, with fixtures written into a tempdir.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const VALID: &str = "model main = \"gpt-4.1\"\n\
                     prompt triage\n\
                     \x20   using model main\n\
                     \x20   \"\"\"Classify: ${ticket}\"\"\"\n\
                     agent support\n\
                     \x20   instruction triage\n";

const WARN_ONLY: &str = "model main = \"gpt-4.1\"\n\
                         prompt triage\n\
                         \x20   using model main\n\
                         \x20   \"\"\"x\"\"\"\n\
                         agent support\n\
                         \x20   instruction triage\n\
                         flow f do\n\
                         \x20   loop do\n\
                         \x20       return\n\
                         \x20   end\n\
                         end\n";

fn weave() -> Command {
    Command::cargo_bin("weave").expect("weave binary")
}

fn fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    weave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Weave workflow language compiler"));
}

#[test]
fn version_exits_0() {
    weave()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("weave"));
}

// ──────────────────────────────────────────────
// 2. Check subcommand
// ──────────────────────────────────────────────

#[test]
fn check_valid_file_exits_0_with_summary() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", VALID);
    weave()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid (1 model, 1 agent)"));
}

#[test]
fn check_undefined_model_exits_1_with_code_and_help() {
    let dir = TempDir::new().unwrap();
    let file = fixture(
        &dir,
        "main.weave",
        "model main = \"x\"\n\
         prompt p\n\
         \x20   using model \"missing\"\n\
         \x20   \"\"\"x\"\"\"\n",
    );
    weave()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error[E0001]"))
        .stdout(predicate::str::contains("defined models are: main"));
}

#[test]
fn check_missing_file_exits_2() {
    weave()
        .args(["check", "does-not-exist.weave"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn check_warning_exits_0_with_warning_label() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", WARN_ONLY);
    weave()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("warning[W0001]"))
        .stdout(predicate::str::contains("valid ("));
}

#[test]
fn check_strict_promotes_warnings_to_failure() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", WARN_ONLY);
    weave()
        .args(["check", file.to_str().unwrap(), "--strict"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("warning[W0001]"));
}

#[test]
fn check_json_output_is_structured() {
    let dir = TempDir::new().unwrap();
    let file = fixture(
        &dir,
        "main.weave",
        "agent a\n", // missing instruction
    );
    let output = weave()
        .args(["check", file.to_str().unwrap(), "--output", "json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value =
        serde_json::from_slice(&output).expect("valid JSON on stdout");
    assert_eq!(value["valid"], false);
    assert_eq!(value["diagnostics"][0]["code"], "E0010");
    assert_eq!(value["diagnostics"][0]["severity"], "error");
}

// ──────────────────────────────────────────────
// 3. Build subcommand
// ──────────────────────────────────────────────

#[test]
fn build_writes_artifact_json() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", VALID);
    let out = dir.path().join("artifact.json");
    weave()
        .args([
            "build",
            file.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();
    let text = fs::read_to_string(&out).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(value["artifact"]["agents"].is_array());
    assert!(value["source_map"].is_object());
}

#[test]
fn build_invalid_file_exits_1_without_artifact() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", "agent a\n");
    let out = dir.path().join("artifact.json");
    weave()
        .args([
            "build",
            file.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E0010"));
    assert!(!out.exists());
}

// ──────────────────────────────────────────────
// 4. Dump subcommand
// ──────────────────────────────────────────────

#[test]
fn dump_prints_listing_without_comments_by_default() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", VALID);
    let output = weave()
        .args(["dump", file.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("agent @a0 \"support\""));
    assert!(text.lines().all(|l| !l.trim_start().starts_with(';')));
}

#[test]
fn dump_with_source_comments_includes_positions() {
    let dir = TempDir::new().unwrap();
    let file = fixture(&dir, "main.weave", VALID);
    weave()
        .args(["dump", file.to_str().unwrap(), "--source-comments"])
        .assert()
        .success()
        .stdout(predicate::str::contains("; source:"));
}

// ──────────────────────────────────────────────
// 5. Imports on disk
// ──────────────────────────────────────────────

#[test]
fn check_follows_imports_on_disk() {
    let dir = TempDir::new().unwrap();
    fixture(&dir, "lib.weave", "model shared = \"gpt-4.1\"\n");
    let main = fixture(
        &dir,
        "main.weave",
        "import \"lib.weave\"\n\
         prompt p\n\
         \x20   using model shared\n\
         \x20   \"\"\"x\"\"\"\n",
    );
    weave()
        .args(["check", main.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid (1 model"));
}

#[test]
fn circular_imports_report_e0006() {
    let dir = TempDir::new().unwrap();
    fixture(&dir, "b.weave", "import \"a.weave\"\n");
    let a = fixture(&dir, "a.weave", "import \"b.weave\"\n");
    weave()
        .args(["check", a.to_str().unwrap()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("error[E0006]"))
        .stdout(predicate::str::contains("circular import"));
}
