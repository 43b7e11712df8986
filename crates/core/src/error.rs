use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A non-fatal compilation diagnostic.
///
/// Parse-level issues (unparseable conditions, unrecognized session
/// directives) are collected as diagnostics alongside the result
/// rather than printed, so callers and tests can assert on them
/// without capturing output streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic tied to a source location.
    pub fn at(file: &str, line: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            file: Some(file.to_owned()),
            line: Some(line),
            message: message.into(),
        }
    }

    /// Diagnostic with no source location (post-parse stages).
    pub fn general(message: impl Into<String>) -> Self {
        Diagnostic {
            file: None,
            line: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.message),
            (Some(file), None) => write!(f, "{}: {}", file, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// A fatal compilation error.
///
/// Parse-level issues never abort a file; only structural and encoding
/// failures surface here.
#[derive(Debug, Error)]
pub enum CompileError {
    /// No top-level decisions were found across the whole input set.
    #[error("no policy decisions found in input")]
    NothingToCompile,

    /// The persisted encoding of a record could not be produced.
    #[error("failed to encode policy record: {0}")]
    Encode(#[from] serde_yaml::Error),
}
