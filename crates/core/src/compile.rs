//! End-to-end compilation: source text to compiled policy records.
//!
//! This is a thin orchestrator over the pipeline stages. Each source
//! file is parsed with its own variable table; all files' flat paths
//! pool into one optimizer pass so that identical outcomes from
//! different files merge together.

use crate::error::{CompileError, Diagnostic};
use crate::extract::extract_paths;
use crate::optimize::Optimizer;
use crate::parser::parse_source;
use crate::policy::CompiledPolicy;

/// One in-memory source file. `name` is used for diagnostics only.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Result of one compilation run.
#[derive(Debug)]
pub struct CompileOutcome {
    pub policies: Vec<CompiledPolicy>,
    pub diagnostics: Vec<Diagnostic>,
    /// Flat paths extracted across all files, before clustering.
    pub path_count: usize,
    /// Top-level decisions parsed across all files.
    pub decision_count: usize,
}

/// Compile a set of source files into policy records, with record
/// naming starting at 1.
pub fn compile(sources: &[SourceFile]) -> Result<CompileOutcome, CompileError> {
    compile_with_counter(sources, 1)
}

/// Compile with an explicit record-naming counter seed.
pub fn compile_with_counter(
    sources: &[SourceFile],
    start_counter: u32,
) -> Result<CompileOutcome, CompileError> {
    let mut diagnostics = Vec::new();
    let mut paths = Vec::new();
    let mut decision_count = 0;

    for source in sources {
        let outcome = parse_source(&source.name, &source.text);
        diagnostics.extend(outcome.diagnostics);
        decision_count += outcome.decisions.len();
        paths.extend(extract_paths(&outcome.decisions));
    }

    if decision_count == 0 {
        return Err(CompileError::NothingToCompile);
    }

    let path_count = paths.len();
    let optimized = Optimizer::with_counter(start_counter).optimize(&paths);
    diagnostics.extend(optimized.diagnostics);

    Ok(CompileOutcome {
        policies: optimized.policies,
        diagnostics,
        path_count,
        decision_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PolicyState;

    #[test]
    fn require_mfa_round_trip() {
        let sources = [SourceFile::new(
            "a.capl",
            "IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n",
        )];
        let outcome = compile(&sources).unwrap();
        assert_eq!(outcome.policies.len(), 1);
        let policy = &outcome.policies[0];
        let grant = policy.grant_controls.as_ref().unwrap();
        assert_eq!(grant.operator, "AND");
        assert_eq!(grant.built_in_controls, vec!["mfa"]);
        assert!(policy.session_controls.is_none());
        assert_eq!(policy.display_name, "Generated-Policy-1");
    }

    #[test]
    fn end_to_end_block_on_windows() {
        let sources = [SourceFile::new(
            "b.capl",
            "IF platform is Windows\n    STATE enabled\n        BLOCK\nEND\n",
        )];
        let outcome = compile(&sources).unwrap();
        assert_eq!(outcome.policies.len(), 1);
        let policy = &outcome.policies[0];
        assert_eq!(
            policy
                .conditions
                .platforms
                .as_ref()
                .unwrap()
                .include_platforms,
            Some(vec!["Windows".to_owned()])
        );
        let grant = policy.grant_controls.as_ref().unwrap();
        assert_eq!(grant.operator, "OR");
        assert_eq!(grant.built_in_controls, vec!["block"]);
    }

    #[test]
    fn cross_file_clustering_merges_identical_outcomes() {
        let sources = [
            SourceFile::new(
                "one.capl",
                "IF platform is Windows\n    STATE enabled\n        BLOCK\nEND\n",
            ),
            SourceFile::new(
                "two.capl",
                "IF platform is macOS\n    STATE enabled\n        BLOCK\nEND\n",
            ),
        ];
        let outcome = compile(&sources).unwrap();
        assert_eq!(outcome.path_count, 2);
        assert_eq!(outcome.policies.len(), 1);
        let platforms = outcome.policies[0]
            .conditions
            .platforms
            .as_ref()
            .unwrap()
            .include_platforms
            .as_ref()
            .unwrap();
        assert_eq!(platforms, &vec!["Windows".to_owned(), "macOS".to_owned()]);
    }

    #[test]
    fn variable_tables_do_not_leak_between_files() {
        let sources = [
            SourceFile::new(
                "decl.capl",
                "VAR Execs = \"Executives\" [e-1]\nIF user in group Execs\n    STATE enabled\n        BLOCK\nEND\n",
            ),
            SourceFile::new(
                "other.capl",
                "IF user in group Execs\n    STATE enabled\n        REQUIRE MFA\nEND\n",
            ),
        ];
        let outcome = compile(&sources).unwrap();
        // The second file's use of the name is an unknown condition.
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.file.as_deref() == Some("other.capl")));
    }

    #[test]
    fn no_decisions_is_nothing_to_compile() {
        let sources = [SourceFile::new("empty.capl", "# just a comment\n")];
        let err = compile(&sources).unwrap_err();
        assert!(matches!(err, CompileError::NothingToCompile));
    }

    #[test]
    fn empty_input_set_is_nothing_to_compile() {
        let err = compile(&[]).unwrap_err();
        assert!(matches!(err, CompileError::NothingToCompile));
    }

    #[test]
    fn report_only_and_enabled_stay_separate() {
        let sources = [SourceFile::new(
            "c.capl",
            "IF platform is Windows\n    STATE enabled\n        BLOCK\nEND\n\
             IF platform is Windows\n    STATE report-only\n        BLOCK\nEND\n",
        )];
        let outcome = compile(&sources).unwrap();
        assert_eq!(outcome.policies.len(), 2);
        assert_eq!(outcome.policies[0].state, PolicyState::Enabled);
        assert_eq!(outcome.policies[1].state, PolicyState::ReportOnly);
    }

    #[test]
    fn counter_seed_threads_through() {
        let sources = [SourceFile::new(
            "d.capl",
            "IF user is All\n    STATE enabled\n        BLOCK\nEND\n",
        )];
        let outcome = compile_with_counter(&sources, 42).unwrap();
        assert_eq!(outcome.policies[0].display_name, "Generated-Policy-42");
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let sources = [SourceFile::new(
            "e.capl",
            "IF platform is iOS OR platform is Android\n    device is Compliant\n    STATE enabled\n        REQUIRE AppProtection OR CompliantDevice\n        SESSION signin-frequency 8 hours\nEND\n",
        )];
        let first = compile(&sources).unwrap();
        let second = compile(&sources).unwrap();
        assert_eq!(first.policies, second.policies);
    }
}
