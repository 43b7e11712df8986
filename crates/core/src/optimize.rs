//! Optimizer: flat paths to consolidated policy records.
//!
//! Reduces N flat paths to M <= N records with identical aggregate
//! enforcement behavior. Paths are clustered by enforcement-outcome
//! signature plus state; each cluster's conditions are merged under
//! kind-specific rules and rendered into one [`CompiledPolicy`].
//!
//! Ordering guarantees: cluster emission order is insertion order (the
//! first path of a new signature fixes the cluster's position), merged
//! list values are sorted, and record naming is strictly sequential
//! from the counter the optimizer was constructed with.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{Condition, ConditionKind, FlatPath, Operator, PolicyState};
use crate::error::Diagnostic;
use crate::policy::{
    build_conditions, build_grant_controls, build_session_controls, CompiledPolicy,
};

/// Result of one optimizer invocation.
#[derive(Debug, Default)]
pub struct OptimizeOutcome {
    pub policies: Vec<CompiledPolicy>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A set of flat paths sharing one enforcement-outcome signature and
/// state.
#[derive(Debug)]
struct Cluster {
    state: PolicyState,
    paths: Vec<FlatPath>,
}

/// Compute a path's enforcement-outcome signature.
///
/// Any `block` action collapses the signature to `BLOCK`. Otherwise
/// `require` values are exploded on `|` into individual control names,
/// sorted (not deduplicated) and joined; session values likewise. The
/// grant component defaults to the sentinel `ALLOW` token.
pub fn outcome_signature(path: &FlatPath) -> String {
    use crate::ast::ActionKind;

    if path.actions.iter().any(|a| a.kind == ActionKind::Block) {
        return "BLOCK".to_owned();
    }

    let mut grants = Vec::new();
    let mut sessions = Vec::new();
    for action in &path.actions {
        match (action.kind, &action.value) {
            (ActionKind::Require, Some(value)) => {
                grants.extend(value.split('|').map(str::to_owned));
            }
            (ActionKind::Session, Some(value)) => sessions.push(value.clone()),
            _ => {}
        }
    }
    grants.sort();
    sessions.sort();

    let grant_sig = if grants.is_empty() {
        "ALLOW".to_owned()
    } else {
        grants.join(",")
    };
    if sessions.is_empty() {
        format!("GRANT:{}", grant_sig)
    } else {
        format!("GRANT:{}|SESSION:{}", grant_sig, sessions.join(","))
    }
}

fn cluster_key(path: &FlatPath) -> String {
    format!("{}|STATE:{}", outcome_signature(path), path.state.as_str())
}

/// Policy optimizer. Carries the record-naming counter explicitly so
/// compilation is a pure function of its inputs.
#[derive(Debug)]
pub struct Optimizer {
    counter: u32,
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer::with_counter(1)
    }

    /// Seed the record-naming counter. Records are named
    /// `Generated-Policy-<n>` starting from `start`.
    pub fn with_counter(start: u32) -> Self {
        Optimizer { counter: start }
    }

    /// Cluster and merge flat paths into compiled policy records.
    pub fn optimize(mut self, paths: &[FlatPath]) -> OptimizeOutcome {
        let mut outcome = OptimizeOutcome::default();
        for cluster in cluster_paths(paths) {
            let (policy, diagnostics) = self.render_cluster(&cluster);
            outcome.policies.push(policy);
            outcome.diagnostics.extend(diagnostics);
        }
        outcome
    }

    fn render_cluster(&mut self, cluster: &Cluster) -> (CompiledPolicy, Vec<Diagnostic>) {
        let merged = merge_cluster_conditions(&cluster.paths);
        // Every path in the cluster carries the same outcome, so the
        // first path's actions stand for all of them.
        let actions = &cluster.paths[0].actions;

        let name = format!("Generated-Policy-{}", self.counter);
        self.counter += 1;

        let (session_controls, diagnostics) = build_session_controls(actions);
        let policy = CompiledPolicy {
            display_name: name,
            state: cluster.state,
            conditions: build_conditions(&merged),
            grant_controls: build_grant_controls(actions),
            session_controls,
        };
        (policy, diagnostics)
    }
}

/// Group paths by full cluster key, preserving first-seen order.
fn cluster_paths(paths: &[FlatPath]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for path in paths {
        let key = cluster_key(path);
        match index.get(&key) {
            Some(&i) => clusters[i].paths.push(path.clone()),
            None => {
                index.insert(key, clusters.len());
                clusters.push(Cluster {
                    state: path.state,
                    paths: vec![path.clone()],
                });
            }
        }
    }
    clusters
}

/// Merge a cluster's conditions, kind by kind, in the order each kind
/// first appears across the cluster's paths.
fn merge_cluster_conditions(paths: &[FlatPath]) -> Vec<Condition> {
    let mut kind_order: Vec<ConditionKind> = Vec::new();
    let mut groups: HashMap<ConditionKind, Vec<&Condition>> = HashMap::new();
    for path in paths {
        for cond in &path.conditions {
            if !groups.contains_key(&cond.kind) {
                kind_order.push(cond.kind);
            }
            groups.entry(cond.kind).or_default().push(cond);
        }
    }

    let mut merged = Vec::new();
    for kind in kind_order {
        merged.extend(merge_conditions_of_kind(kind, &groups[&kind]));
    }
    merged
}

/// The kind-specific merge rule table.
fn merge_conditions_of_kind(kind: ConditionKind, conditions: &[&Condition]) -> Vec<Condition> {
    match kind {
        // List-capable kinds: union all literal values (exploding
        // existing OR-lists) into one sorted OR-list condition.
        ConditionKind::Platform
        | ConditionKind::Location
        | ConditionKind::Client
        | ConditionKind::Application => {
            let mut values = BTreeSet::new();
            for cond in conditions {
                if cond.operator == Operator::IsOr {
                    values.extend(cond.value.split('|').map(str::to_owned));
                } else {
                    values.insert(cond.value.clone());
                }
            }
            if values.len() > 1 {
                vec![Condition::new(
                    kind,
                    Operator::IsOr,
                    values.into_iter().collect::<Vec<_>>().join("|"),
                )]
            } else {
                vec![conditions[0].clone()]
            }
        }

        // Identifier-keyed kinds: one condition per unique identifier,
        // value and negation taken from the first path carrying it.
        ConditionKind::UserGroup | ConditionKind::UserRole => {
            let mut seen: Vec<&str> = Vec::new();
            let mut merged = Vec::new();
            for cond in conditions {
                let id = match &cond.identifier {
                    Some(id) => id.as_str(),
                    None => continue,
                };
                if !seen.contains(&id) {
                    seen.push(id);
                    merged.push((*cond).clone());
                }
            }
            merged
        }

        // Everything else: the first occurrence stands for the
        // cluster. This assumes paths routed into one cluster agree on
        // these kinds; later occurrences are discarded without a
        // consistency check.
        ConditionKind::User
        | ConditionKind::Device
        | ConditionKind::SigninRisk
        | ConditionKind::UserRisk
        | ConditionKind::Unknown => vec![conditions[0].clone()],
    }
}
