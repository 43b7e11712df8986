use std::path::Path;
use std::process;

use capl_core::CompiledPolicy;
use capl_simulate::{CoverageMatrix, Outcome};

use crate::commands::{discover_files, file_label};
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_simulate(input: &Path, gaps: bool, output: OutputFormat, quiet: bool) {
    let files = match discover_files(input, &["yaml", "yml"], false) {
        Ok(files) => files,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    if files.is_empty() {
        report_error(
            &format!("no record files found in '{}'", input.display()),
            output,
            quiet,
        );
        process::exit(1);
    }

    let mut policies = Vec::new();
    for path in &files {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                report_error(&format!("cannot read '{}': {}", path.display(), e), output, quiet);
                continue;
            }
        };
        match CompiledPolicy::from_yaml(&text) {
            Ok(policy) => policies.push(policy),
            Err(e) => report_error(
                &format!("cannot parse record '{}': {}", file_label(path), e),
                output,
                quiet,
            ),
        }
    }
    if policies.is_empty() {
        report_error("no policy records loaded", output, quiet);
        process::exit(1);
    }

    let matrix = CoverageMatrix::evaluate(&policies);
    let gap_count = matrix.unprotected().count();

    match output {
        OutputFormat::Json => {
            let value = if gaps {
                serde_json::json!({
                    "gaps": matrix.unprotected().collect::<Vec<_>>(),
                })
            } else {
                serde_json::json!({
                    "scenarios": matrix.rows.len(),
                    "gaps": gap_count,
                    "rows": matrix.rows,
                })
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                if gaps {
                    for row in matrix.unprotected() {
                        let s = &row.scenario;
                        println!(
                            "{} | {} | {} | {} | {} | {} | signin:{} user:{}",
                            s.user,
                            s.application,
                            s.platform,
                            s.location,
                            s.device_state,
                            s.client_type,
                            s.signin_risk,
                            s.user_risk,
                        );
                    }
                } else {
                    print!("{}", matrix.to_text());
                }
                let blocked = matrix
                    .rows
                    .iter()
                    .filter(|row| row.outcome == Outcome::Block)
                    .count();
                println!(
                    "{} scenario(s): {} blocked, {} unprotected",
                    matrix.rows.len(),
                    blocked,
                    gap_count,
                );
            }
        }
    }
}
