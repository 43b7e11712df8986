//! capl-simulate: "what if" coverage analysis for compiled policies.
//!
//! Takes the records `capl-core` emits and evaluates them against a
//! grid of concrete sign-in scenarios, spanning every user, app,
//! platform, location, device state, client type, and risk level the
//! policy set mentions. The output answers two questions: what happens
//! to a given sign-in, and which scenarios no enforcing policy covers.

pub mod dimensions;
pub mod grid;

pub use dimensions::ScenarioDimensions;
pub use grid::{policy_applies, CoverageMatrix, CoverageRow, Outcome, Scenario};
