use std::fs;
use std::path::Path;

use weave_core::diag;

use crate::{report_io_error, CliError, OutputFormat};

pub(crate) fn run(file: &Path, out: Option<&Path>, output: OutputFormat, quiet: bool) -> i32 {
    let result = match weave_codegen::compile_path(file) {
        Ok(result) => result,
        Err(source) => {
            let err = CliError::Unreadable {
                path: file.display().to_string(),
                source,
            };
            return report_io_error(&err, output, quiet);
        }
    };

    if !result.diagnostics.is_empty() && !quiet {
        let format = match output {
            OutputFormat::Text => diag::Format::Text,
            OutputFormat::Json => diag::Format::Structured,
        };
        eprintln!(
            "{}",
            diag::render(&result.diagnostics, format, &result.sources)
        );
    }

    let Some(artifact) = &result.artifact else {
        return 1;
    };

    let value = serde_json::json!({
        "artifact": artifact,
        "source_map": &result.source_map,
    });
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    match out {
        Some(path) => {
            if let Err(source) = fs::write(path, text + "\n") {
                let err = CliError::WriteFailed {
                    path: path.display().to_string(),
                    source,
                };
                return report_io_error(&err, output, quiet);
            }
            if !quiet && output == OutputFormat::Text {
                println!("wrote {}", path.display());
            }
        }
        None => println!("{}", text),
    }
    0
}
