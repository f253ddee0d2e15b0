use std::path::Path;

use weave_core::diag;

use crate::{report_io_error, CliError, OutputFormat};

pub(crate) fn run(file: &Path, strict: bool, output: OutputFormat, quiet: bool) -> i32 {
    let report = match weave_core::check_path(file) {
        Ok(report) => report,
        Err(source) => {
            let err = CliError::Unreadable {
                path: file.display().to_string(),
                source,
            };
            return report_io_error(&err, output, quiet);
        }
    };

    let exit = diag::exit_code(&report.diagnostics, strict);
    match output {
        OutputFormat::Json => {
            let records: Vec<serde_json::Value> = report
                .diagnostics
                .iter()
                .map(|d| {
                    let rendered =
                        diag::render(std::slice::from_ref(d), diag::Format::Structured, &report.sources);
                    serde_json::from_str(&rendered).unwrap_or(serde_json::Value::Null)
                })
                .collect();
            let value = serde_json::json!({
                "valid": report.is_valid(),
                "summary": report.summary,
                "diagnostics": records,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            );
        }
        OutputFormat::Text => {
            if !report.diagnostics.is_empty() && !quiet {
                println!(
                    "{}",
                    diag::render(&report.diagnostics, diag::Format::Text, &report.sources)
                );
            }
            if !quiet {
                if report.is_valid() && (!strict || exit == 0) {
                    println!("valid ({})", report.summary.describe());
                } else {
                    let errors = report.diagnostics.iter().filter(|d| d.is_error()).count();
                    let warnings = report.diagnostics.len() - errors;
                    println!("invalid: {} error(s), {} warning(s)", errors, warnings);
                }
            }
        }
    }
    exit
}
