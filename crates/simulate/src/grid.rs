//! Scenario grid evaluation.
//!
//! Crosses every dimension value into concrete sign-in scenarios,
//! decides which compiled policies apply to each, and folds the
//! applicable policies into a single access outcome. Disabled and
//! report-only policies are listed as matches but never enforce.

use serde::Serialize;

use capl_core::{CompiledPolicy, PolicyState};

use crate::dimensions::ScenarioDimensions;

/// One concrete sign-in attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub user: String,
    pub application: String,
    pub platform: String,
    pub location: String,
    pub device_state: String,
    pub client_type: String,
    pub signin_risk: String,
    pub user_risk: String,
}

/// Access outcome after folding all enforcing policies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// An enforcing policy blocks the sign-in.
    Block,
    /// Access granted subject to the union of required controls.
    Grant { requirements: Vec<String> },
    /// No enforcing policy applies.
    Unprotected,
}

/// One evaluated grid cell.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageRow {
    pub scenario: Scenario,
    pub outcome: Outcome,
    /// Display names of every applicable policy, enforcing or not.
    pub matched_policies: Vec<String>,
}

/// The full evaluated grid.
#[derive(Debug, Serialize)]
pub struct CoverageMatrix {
    pub rows: Vec<CoverageRow>,
}

impl CoverageMatrix {
    /// Evaluate the policy set over its own extracted dimensions.
    pub fn evaluate(policies: &[CompiledPolicy]) -> Self {
        let dimensions = ScenarioDimensions::from_policies(policies);
        Self::evaluate_with_dimensions(policies, &dimensions)
    }

    pub fn evaluate_with_dimensions(
        policies: &[CompiledPolicy],
        dimensions: &ScenarioDimensions,
    ) -> Self {
        let rows = scenarios(dimensions)
            .into_iter()
            .map(|scenario| {
                let matched: Vec<&CompiledPolicy> = policies
                    .iter()
                    .filter(|p| policy_applies(p, &scenario))
                    .collect();
                let outcome = fold_outcome(&matched);
                CoverageRow {
                    outcome,
                    matched_policies: matched
                        .iter()
                        .map(|p| p.display_name.clone())
                        .collect(),
                    scenario,
                }
            })
            .collect();
        CoverageMatrix { rows }
    }

    /// Grid cells no enforcing policy covers.
    pub fn unprotected(&self) -> impl Iterator<Item = &CoverageRow> {
        self.rows
            .iter()
            .filter(|row| row.outcome == Outcome::Unprotected)
    }

    /// Plain-text rendering, one line per grid cell.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let s = &row.scenario;
            let verdict = match &row.outcome {
                Outcome::Block => "BLOCK".to_owned(),
                Outcome::Grant { requirements } if requirements.is_empty() => {
                    "GRANT".to_owned()
                }
                Outcome::Grant { requirements } => {
                    format!("GRANT [{}]", requirements.join(", "))
                }
                Outcome::Unprotected => "UNPROTECTED".to_owned(),
            };
            out.push_str(&format!(
                "{} | {} | {} | {} | {} | {} | signin:{} user:{} => {}\n",
                s.user,
                s.application,
                s.platform,
                s.location,
                s.device_state,
                s.client_type,
                s.signin_risk,
                s.user_risk,
                verdict,
            ));
        }
        out
    }
}

/// Cross product of all dimension values, in dimension order.
pub fn scenarios(dims: &ScenarioDimensions) -> Vec<Scenario> {
    let mut out = Vec::new();
    for user in &dims.users {
        for application in &dims.applications {
            for platform in &dims.platforms {
                for location in &dims.locations {
                    for device_state in &dims.device_states {
                        for client_type in &dims.client_types {
                            for signin_risk in &dims.signin_risks {
                                for user_risk in &dims.user_risks {
                                    out.push(Scenario {
                                        user: user.clone(),
                                        application: application.clone(),
                                        platform: platform.clone(),
                                        location: location.clone(),
                                        device_state: device_state.clone(),
                                        client_type: client_type.clone(),
                                        signin_risk: signin_risk.clone(),
                                        user_risk: user_risk.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Decide whether one compiled policy constrains this scenario.
///
/// A missing condition section is unconstrained: the policy applies
/// regardless of that dimension. Sections that are present must all
/// match.
pub fn policy_applies(policy: &CompiledPolicy, scenario: &Scenario) -> bool {
    let conditions = &policy.conditions;

    if let Some(users) = &conditions.users {
        if let Some(excluded) = &users.exclude_groups {
            if excluded.iter().any(|g| g == &scenario.user) {
                return false;
            }
        }
        let includes_all = users
            .include_users
            .as_ref()
            .is_some_and(|u| u.iter().any(|v| v == "All"));
        let includes_user = users
            .include_users
            .as_ref()
            .is_some_and(|u| u.iter().any(|v| v == &scenario.user))
            || users
                .include_groups
                .as_ref()
                .is_some_and(|g| g.iter().any(|v| v == &scenario.user))
            || users
                .include_roles
                .as_ref()
                .is_some_and(|r| r.iter().any(|v| v == &scenario.user));
        // Guest-only scoping never matches a grid user.
        let guest_only = users.include_guest_or_external_user_types.is_some()
            && users.include_users.is_none()
            && users.include_groups.is_none()
            && users.include_roles.is_none();
        if guest_only || (!includes_all && !includes_user) {
            return false;
        }
    }

    if let Some(applications) = &conditions.applications {
        let matched = applications.include_applications.as_ref().is_some_and(|apps| {
            apps.iter()
                .any(|a| a == "All" || a == &scenario.application)
        });
        if !matched {
            return false;
        }
    }

    if let Some(platforms) = &conditions.platforms {
        let matched = platforms.include_platforms.as_ref().is_some_and(|list| {
            list.iter().any(|p| p == "All" || p == &scenario.platform)
        });
        if !matched {
            return false;
        }
    }

    if let Some(locations) = &conditions.locations {
        if let Some(excluded) = &locations.exclude_locations {
            if excluded.iter().any(|l| l == "AllTrusted") && scenario.location == "Trusted" {
                return false;
            }
        }
        if let Some(included) = &locations.include_locations {
            let matched = included.iter().any(|l| match l.as_str() {
                "All" => true,
                "AllTrusted" => scenario.location == "Trusted",
                named => named == scenario.location,
            });
            if !matched {
                return false;
            }
        }
    }

    if let Some(client_types) = &conditions.client_app_types {
        let scenario_types = client_type_vocabulary(&scenario.client_type);
        let matched = client_types
            .iter()
            .any(|c| scenario_types.contains(&c.as_str()));
        if !matched {
            return false;
        }
    }

    if let Some(devices) = &conditions.device_states {
        let managed = scenario.device_state == "Compliant";
        if devices.compliant_device == Some(true) && !managed {
            return false;
        }
        if devices.domain_joined_device == Some(true) && !managed {
            return false;
        }
    }

    if let Some(levels) = &conditions.sign_in_risk_levels {
        if !risk_matches(levels, &scenario.signin_risk) {
            return false;
        }
    }
    if let Some(levels) = &conditions.user_risk_levels {
        if !risk_matches(levels, &scenario.user_risk) {
            return false;
        }
    }

    true
}

/// Backend client-type values a grid client label stands for.
fn client_type_vocabulary(client_type: &str) -> &'static [&'static str] {
    match client_type {
        "Browser" => &["browser"],
        "Mobile/Desktop" => &["mobileAppsAndDesktopClients"],
        "Legacy" => &["exchangeActiveSync", "other"],
        _ => &[],
    }
}

/// A risk-scoped policy never fires on a riskless sign-in.
fn risk_matches(levels: &[String], scenario_risk: &str) -> bool {
    if scenario_risk == "No Risk" {
        return false;
    }
    levels
        .iter()
        .any(|l| l.eq_ignore_ascii_case(scenario_risk))
}

/// Fold the applicable policies into one outcome. Any enforcing block
/// wins; otherwise requirements union across enforcing grants.
fn fold_outcome(matched: &[&CompiledPolicy]) -> Outcome {
    let enforcing: Vec<&&CompiledPolicy> = matched
        .iter()
        .filter(|p| p.state == PolicyState::Enabled)
        .collect();
    if enforcing.is_empty() {
        return Outcome::Unprotected;
    }

    let mut requirements = Vec::new();
    for policy in &enforcing {
        if let Some(grant) = &policy.grant_controls {
            if grant.built_in_controls.iter().any(|c| c == "block") {
                return Outcome::Block;
            }
            for control in &grant.built_in_controls {
                if !requirements.contains(control) {
                    requirements.push(control.clone());
                }
            }
        }
    }
    Outcome::Grant { requirements }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capl_core::{compile, SourceFile};

    fn compiled(src: &str) -> Vec<CompiledPolicy> {
        compile(&[SourceFile::new("test.capl", src)]).unwrap().policies
    }

    fn scenario() -> Scenario {
        Scenario {
            user: "GenericUser".to_owned(),
            application: "GenericApp".to_owned(),
            platform: "Windows".to_owned(),
            location: "Untrusted".to_owned(),
            device_state: "Compliant".to_owned(),
            client_type: "Browser".to_owned(),
            signin_risk: "No Risk".to_owned(),
            user_risk: "No Risk".to_owned(),
        }
    }

    #[test]
    fn all_users_policy_applies_everywhere() {
        let policies =
            compiled("IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n");
        assert!(policy_applies(&policies[0], &scenario()));
    }

    #[test]
    fn platform_scoping_filters() {
        let policies =
            compiled("IF platform is macOS\n    STATE enabled\n        BLOCK\nEND\n");
        let mut s = scenario();
        assert!(!policy_applies(&policies[0], &s));
        s.platform = "macOS".to_owned();
        assert!(policy_applies(&policies[0], &s));
    }

    #[test]
    fn excluded_group_never_matches() {
        let policies = compiled(
            "IF user is All\n    user NOT in group \"Break Glass\" [bg-1]\n    STATE enabled\n        BLOCK\nEND\n",
        );
        let mut s = scenario();
        assert!(policy_applies(&policies[0], &s));
        s.user = "bg-1".to_owned();
        assert!(!policy_applies(&policies[0], &s));
    }

    #[test]
    fn trusted_location_exclusion() {
        let policies = compiled(
            "IF user is All\n    location NOT is Trusted\n    STATE enabled\n        REQUIRE MFA\nEND\n",
        );
        let mut s = scenario();
        assert!(policy_applies(&policies[0], &s));
        s.location = "Trusted".to_owned();
        assert!(!policy_applies(&policies[0], &s));
    }

    #[test]
    fn compliant_device_requirement_filters_unmanaged() {
        let policies = compiled(
            "IF device is Compliant\n    STATE enabled\n        ALLOW\nEND\n",
        );
        let mut s = scenario();
        assert!(policy_applies(&policies[0], &s));
        s.device_state = "Unmanaged".to_owned();
        assert!(!policy_applies(&policies[0], &s));
    }

    #[test]
    fn risk_scoped_policy_ignores_riskless_signin() {
        let policies = compiled(
            "IF signin-risk is High\n    STATE enabled\n        BLOCK\nEND\n",
        );
        let mut s = scenario();
        assert!(!policy_applies(&policies[0], &s));
        s.signin_risk = "High".to_owned();
        assert!(policy_applies(&policies[0], &s));
    }

    #[test]
    fn legacy_client_matches_either_legacy_type() {
        let policies = compiled(
            "IF client is ExchangeActiveSync OR client is Other\n    STATE enabled\n        BLOCK\nEND\n",
        );
        let mut s = scenario();
        assert!(!policy_applies(&policies[0], &s));
        s.client_type = "Legacy".to_owned();
        assert!(policy_applies(&policies[0], &s));
    }

    #[test]
    fn block_wins_over_grant() {
        let policies = compiled(
            "IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n\
             IF platform is Windows\n    STATE enabled\n        BLOCK\nEND\n",
        );
        let matched: Vec<&CompiledPolicy> = policies.iter().collect();
        assert_eq!(fold_outcome(&matched), Outcome::Block);
    }

    #[test]
    fn report_only_policy_does_not_enforce() {
        let policies = compiled(
            "IF user is All\n    STATE report-only\n        BLOCK\nEND\n",
        );
        let matrix = CoverageMatrix::evaluate(&policies);
        assert!(matrix
            .rows
            .iter()
            .all(|row| row.outcome == Outcome::Unprotected));
        // Matches are still reported for visibility.
        assert!(matrix
            .rows
            .iter()
            .all(|row| !row.matched_policies.is_empty()));
    }

    #[test]
    fn requirements_union_across_policies() {
        let policies = compiled(
            "IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n\
             IF platform is Windows\n    STATE enabled\n        REQUIRE CompliantDevice\nEND\n",
        );
        let matched: Vec<&CompiledPolicy> = policies.iter().collect();
        assert_eq!(
            fold_outcome(&matched),
            Outcome::Grant {
                requirements: vec!["mfa".to_owned(), "compliantDevice".to_owned()]
            }
        );
    }

    #[test]
    fn grid_size_is_dimension_product() {
        let policies =
            compiled("IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n");
        let dims = ScenarioDimensions::from_policies(&policies);
        let expected = dims.users.len()
            * dims.applications.len()
            * dims.platforms.len()
            * dims.locations.len()
            * dims.device_states.len()
            * dims.client_types.len()
            * dims.signin_risks.len()
            * dims.user_risks.len();
        let matrix = CoverageMatrix::evaluate(&policies);
        assert_eq!(matrix.rows.len(), expected);
    }

    #[test]
    fn unprotected_rows_surface_gaps() {
        // Risk-scoped policies never fire on riskless sign-ins, so
        // those cells stay uncovered.
        let policies = compiled(
            "IF signin-risk is High\n    STATE enabled\n        REQUIRE MFA\nEND\n",
        );
        let matrix = CoverageMatrix::evaluate(&policies);
        assert!(matrix.unprotected().count() > 0);
        assert!(matrix
            .unprotected()
            .all(|row| row.scenario.signin_risk == "No Risk"));
    }

    #[test]
    fn text_rendering_carries_verdicts() {
        let policies =
            compiled("IF user is All\n    STATE enabled\n        BLOCK\nEND\n");
        let text = CoverageMatrix::evaluate(&policies).to_text();
        assert!(text.contains("=> BLOCK"));
        assert!(!text.contains("UNPROTECTED"));
    }

    #[test]
    fn matrix_serializes_to_json() {
        let policies =
            compiled("IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n");
        let matrix = CoverageMatrix::evaluate(&policies);
        let json = serde_json::to_value(&matrix).unwrap();
        let row = &json["rows"][0];
        assert_eq!(row["outcome"]["kind"], "grant");
        assert_eq!(row["scenario"]["user"], "GenericUser");
    }
}
