//! Path extraction: decision trees to flat condition/action records.
//!
//! Depth-first traversal of each top-level decision, accumulating
//! ancestor conditions, emitting one [`FlatPath`] per reachable leaf
//! branch. Traversal order is `if`, then `else-if` branches in source
//! order, then `else`; that order becomes the emission order and is
//! preserved downstream for deterministic output.
//!
//! Known modeling gap, preserved deliberately: sibling branches are
//! not made mutually exclusive by negating earlier siblings'
//! conditions into later ones. Two paths from the same decision may
//! both match one real-world input when their literal conditions
//! overlap. The source language itself does not enforce
//! first-match-wins at evaluation time, and neither does this
//! extractor.

use crate::ast::{Branch, Condition, Decision, FlatPath};

/// Extract all flat paths from a list of top-level decisions.
pub fn extract_paths(decisions: &[Decision]) -> Vec<FlatPath> {
    let mut paths = Vec::new();
    for decision in decisions {
        walk_decision(decision, &[], &mut paths);
    }
    paths
}

fn walk_decision(decision: &Decision, parent: &[Condition], paths: &mut Vec<FlatPath>) {
    walk_branch(&decision.if_branch, parent, paths);
    for branch in &decision.else_if_branches {
        walk_branch(branch, parent, paths);
    }
    if let Some(branch) = &decision.else_branch {
        walk_branch(branch, parent, paths);
    }
}

fn walk_branch(branch: &Branch, parent: &[Condition], paths: &mut Vec<FlatPath>) {
    let mut accumulated = parent.to_vec();
    accumulated.extend(branch.conditions.iter().cloned());

    // A nested decision is the branch's effective body; no path is
    // emitted at this branch.
    if let Some(nested) = &branch.nested {
        walk_decision(nested, &accumulated, paths);
        return;
    }

    paths.push(FlatPath {
        conditions: accumulated,
        actions: branch.actions.clone(),
        state: branch.state,
    });
}
