use std::path::Path;

use weave_core::diag;

use crate::{report_io_error, CliError, OutputFormat};

pub(crate) fn run(file: &Path, source_comments: bool, output: OutputFormat, quiet: bool) -> i32 {
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

    let Some(artifact) = &result.artifact else {
        if !quiet {
            eprintln!(
                "{}",
                diag::render(&result.diagnostics, diag::Format::Text, &result.sources)
            );
        }
        return 1;
    };

    print!("{}", weave_codegen::dump(artifact, source_comments));
    0
}
