use std::path::Path;
use std::process;

use capl_repair::{repair_source, AzureOpenAiClient, RepairClient};

use crate::commands::{discover_files, file_label};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_repair(input: &Path, out: &Path, output: OutputFormat, quiet: bool) {
    let client = match AzureOpenAiClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };
    run_repair(&client, input, out, output, quiet);
}

/// Repair every draft under `input` into `out`, keeping file names.
/// A draft that fails is reported and skipped; the run fails only when
/// nothing was repaired.
fn run_repair(
    client: &dyn RepairClient,
    input: &Path,
    out: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    // Drafts keep their underscore prefix until repaired, so include
    // them here.
    let files = match discover_files(input, &["capl"], true) {
        Ok(files) => files,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if files.is_empty() {
        report_error(
            &format!("no .capl files found in '{}'", input.display()),
            output,
            quiet,
        );
        process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(out) {
        report_error(
            &format!("cannot create output directory '{}': {}", out.display(), e),
            output,
            quiet,
        );
        process::exit(1);
    }

    let mut written = Vec::new();
    for path in &files {
        let name = file_label(path);
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report_error(&format!("cannot read '{}': {}", path.display(), e), output, quiet);
                continue;
            }
        };
        let repaired = match repair_source(client, &text) {
            Ok(repaired) => repaired,
            Err(e) => {
                report_error(&format!("cannot repair '{}': {}", name, e), output, quiet);
                continue;
            }
        };
        let target = out.join(&name);
        match std::fs::write(&target, repaired) {
            Ok(()) => written.push(name),
            Err(e) => report_error(
                &format!("cannot write '{}': {}", target.display(), e),
                output,
                quiet,
            ),
        }
    }

    match output {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "repaired": written,
                "total": files.len(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!("repaired {} of {} file(s)", written.len(), files.len());
                for name in &written {
                    println!("  {}", name);
                }
            }
        }
    }

    if written.is_empty() {
        process::exit(1);
    }
}
