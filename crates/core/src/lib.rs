//! capl-core: CAPL compiler core library.
//!
//! Compiles Conditional Access Policy Language (CAPL) source text --
//! nested IF/ELSE-IF/ELSE branching over identity, device, network,
//! and risk conditions -- into the minimal set of equivalent-outcome
//! access-control records.
//!
//! The pipeline runs strictly one direction:
//!
//! text -> decision tree -> flat paths -> clusters -> policy records
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`compile()`] / [`compile_with_counter()`] -- run the full pipeline
//! - [`parse_source()`] -- parse one file into decision trees
//! - [`extract_paths()`] -- flatten trees into root-to-leaf paths
//! - [`Optimizer`] -- cluster and merge paths into records
//! - [`CompiledPolicy`] -- the emitted record
//! - [`Diagnostic`], [`CompileError`] -- non-fatal and fatal failures

pub mod ast;
pub mod compile;
pub mod error;
pub mod extract;
pub mod grammar;
pub mod lines;
pub mod optimize;
pub mod parser;
pub mod policy;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{
    Action, ActionKind, Branch, Condition, ConditionKind, Decision, FlatPath, Operator,
    PolicyState, Variable,
};
pub use error::{CompileError, Diagnostic};
pub use policy::CompiledPolicy;

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use compile::{compile, compile_with_counter, CompileOutcome, SourceFile};
pub use extract::extract_paths;
pub use optimize::{outcome_signature, Optimizer};
pub use parser::{parse_source, ParseOutcome};
