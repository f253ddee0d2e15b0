mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Weave workflow language toolchain.
#[derive(Parser)]
#[command(name = "weave", version, about = "Weave workflow language compiler")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a .weave file and report every diagnostic
    Check {
        /// Path to the .weave source file
        file: PathBuf,
        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },

    /// Compile a .weave file to an artifact + source map (JSON)
    Build {
        /// Path to the .weave source file
        file: PathBuf,
        /// Write the artifact here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the generated artifact listing
    Dump {
        /// Path to the .weave source file
        file: PathBuf,
        /// Keep per-statement source-position annotations
        #[arg(long)]
        source_comments: bool,
    },
}

/// I/O-level failures that prevent compilation from starting at all.
/// These map to exit code 2, distinct from diagnostic failures (1).
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("cannot read '{path}': {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Check { ref file, strict } => {
            commands::check::run(file, strict, cli.output, cli.quiet)
        }
        Commands::Build { ref file, ref out } => {
            commands::build::run(file, out.as_deref(), cli.output, cli.quiet)
        }
        Commands::Dump {
            ref file,
            source_comments,
        } => commands::dump::run(file, source_comments, cli.output, cli.quiet),
    };
    process::exit(code);
}

/// Report an I/O failure and return exit code 2.
pub(crate) fn report_io_error(err: &CliError, output: OutputFormat, quiet: bool) -> i32 {
    match output {
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": err.to_string() }));
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error: {}", err);
            }
        }
    }
    2
}
