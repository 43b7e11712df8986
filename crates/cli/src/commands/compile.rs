use std::path::Path;
use std::process;

use capl_core::{compile, CompileError, SourceFile};

use crate::commands::{discover_files, file_label};
use crate::{report_error, OutputFormat, RecordFormat};

pub(crate) fn cmd_compile(
    input: &Path,
    out: &Path,
    format: RecordFormat,
    output: OutputFormat,
    quiet: bool,
) {
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

    // Unreadable files are reported and skipped; compilation continues
    // with the rest.
    let mut sources = Vec::new();
    for path in &files {
        match std::fs::read_to_string(path) {
            Ok(text) => sources.push(SourceFile::new(file_label(path), text)),
            Err(e) => report_error(
                &format!("cannot read '{}': {}", path.display(), e),
                output,
                quiet,
            ),
        }
    }

    let outcome = match compile(&sources) {
        Ok(outcome) => outcome,
        Err(CompileError::NothingToCompile) => {
            report_error("no decisions found to compile", output, quiet);
            process::exit(1);
        }
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(out) {
        report_error(
            &format!("cannot create output directory '{}': {}", out.display(), e),
            output,
            quiet,
        );
        process::exit(1);
    }

    let extension = match format {
        RecordFormat::Yaml => "yaml",
        RecordFormat::Json => "json",
    };
    let mut written = Vec::new();
    for (index, policy) in outcome.policies.iter().enumerate() {
        let encoded = match format {
            RecordFormat::Yaml => policy.to_yaml().map_err(|e| e.to_string()),
            RecordFormat::Json => {
                serde_json::to_string_pretty(policy).map_err(|e| e.to_string())
            }
        };
        let encoded = match encoded {
            Ok(text) => text,
            Err(msg) => {
                report_error(
                    &format!("cannot encode {}: {}", policy.display_name, msg),
                    output,
                    quiet,
                );
                continue;
            }
        };
        let file_name = format!("Policy-{:03}.{}", index + 1, extension);
        let path = out.join(&file_name);
        match std::fs::write(&path, encoded) {
            Ok(()) => written.push(file_name),
            Err(e) => report_error(
                &format!("cannot write '{}': {}", path.display(), e),
                output,
                quiet,
            ),
        }
    }

    match output {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "files": sources.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
                "decisions": outcome.decision_count,
                "paths": outcome.path_count,
                "policies": outcome.policies.len(),
                "written": written,
                "diagnostics": outcome.diagnostics,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            for diagnostic in &outcome.diagnostics {
                if !quiet {
                    eprintln!("warning: {}", diagnostic);
                }
            }
            if !quiet {
                println!(
                    "compiled {} file(s): {} decision(s), {} path(s), {} policy record(s)",
                    sources.len(),
                    outcome.decision_count,
                    outcome.path_count,
                    outcome.policies.len(),
                );
                for file_name in &written {
                    println!("  {}", file_name);
                }
            }
        }
    }

    if written.is_empty() {
        process::exit(1);
    }
}
