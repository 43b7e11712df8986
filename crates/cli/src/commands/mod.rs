pub(crate) mod check;
pub(crate) mod compile;
pub(crate) mod repair;
pub(crate) mod simulate;

use std::path::{Path, PathBuf};

/// Find the source files under `input`: the file itself, or every
/// matching file in the directory, sorted by name. Files whose names
/// start with `_` are drafts and are skipped unless `include_drafts`.
pub(crate) fn discover_files(
    input: &Path,
    extensions: &[&str],
    include_drafts: bool,
) -> Result<Vec<PathBuf>, String> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(format!("input path '{}' not found", input.display()));
    }

    let entries = std::fs::read_dir(input)
        .map_err(|e| format!("cannot read directory '{}': {}", input.display(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| format!("cannot read directory '{}': {}", input.display(), e))?
            .path();
        if !path.is_file() {
            continue;
        }
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !matches_ext {
            continue;
        }
        if !include_drafts {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('_'));
            if hidden {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// File name without its directory, for messages.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| path.display().to_string())
}
