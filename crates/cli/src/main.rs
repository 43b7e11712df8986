mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use commands::check::cmd_check;
use commands::compile::cmd_compile;
use commands::repair::cmd_repair;
use commands::simulate::cmd_simulate;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Encoding for generated policy record files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum RecordFormat {
    Yaml,
    Json,
}

/// CAPL policy language toolchain.
#[derive(Parser)]
#[command(name = "capl", version, about = "CAPL conditional access policy compiler")]
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
    /// Compile .capl sources into consolidated policy records
    Compile {
        /// Path to a .capl file or a directory of .capl files
        input: PathBuf,
        /// Output directory for generated record files
        #[arg(long, default_value = "./policies-generated")]
        out: PathBuf,
        /// Record file encoding (yaml or json)
        #[arg(long, default_value = "yaml", value_enum)]
        format: RecordFormat,
    },

    /// Parse .capl sources and report diagnostics without writing records
    Check {
        /// Path to a .capl file or a directory of .capl files
        input: PathBuf,
    },

    /// Rewrite rough policy drafts into valid CAPL with an LLM
    Repair {
        /// Path to a rough .capl file or a directory of drafts
        input: PathBuf,
        /// Output directory for repaired sources
        #[arg(long, default_value = "./policies-repaired")]
        out: PathBuf,
    },

    /// Evaluate compiled policy records over a scenario coverage grid
    Simulate {
        /// Path to a record file or a directory of compiled records
        input: PathBuf,
        /// Show only scenarios no enforcing policy covers
        #[arg(long)]
        gaps: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, out, format } => {
            cmd_compile(&input, &out, format, cli.output, cli.quiet);
        }
        Commands::Check { input } => {
            cmd_check(&input, cli.output, cli.quiet);
        }
        Commands::Repair { input, out } => {
            cmd_repair(&input, &out, cli.output, cli.quiet);
        }
        Commands::Simulate { input, gaps } => {
            cmd_simulate(&input, gaps, cli.output, cli.quiet);
        }
    }
}

/// Report one error in the selected output format.
pub(crate) fn report_error(message: &str, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": message }));
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error: {}", message);
            }
        }
    }
}
