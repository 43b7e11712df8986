use std::path::Path;
use std::process;

use capl_core::{parse_source, Diagnostic};

use crate::commands::{discover_files, file_label};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_check(input: &Path, output: OutputFormat, quiet: bool) {
    let files = match discover_files(input, &["capl"], false) {
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

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let mut decision_count = 0;
    let mut checked = Vec::new();
    let mut failed = false;

    for path in &files {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report_error(
                    &format!("cannot read '{}': {}", path.display(), e),
                    output,
                    quiet,
                );
                failed = true;
                continue;
            }
        };
        let name = file_label(path);
        let outcome = parse_source(&name, &text);
        decision_count += outcome.decisions.len();
        diagnostics.extend(outcome.diagnostics);
        checked.push(name);
    }

    match output {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "files": checked,
                "decisions": decision_count,
                "diagnostics": diagnostics,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                for diagnostic in &diagnostics {
                    println!("warning: {}", diagnostic);
                }
                println!(
                    "checked {} file(s): {} decision(s), {} warning(s)",
                    checked.len(),
                    decision_count,
                    diagnostics.len(),
                );
            }
        }
    }

    if failed || checked.is_empty() {
        process::exit(1);
    }
}
