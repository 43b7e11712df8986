//! Scenario dimension extraction.
//!
//! Walks a compiled policy set and collects every concrete value it
//! mentions per axis, then fills in semantic defaults so the grid
//! always exercises the interesting contrasts (trusted vs untrusted
//! network, managed vs unmanaged device, riskless vs high risk).

use capl_core::CompiledPolicy;

/// Maximum concrete values kept per extracted axis.
const MAX_VALUES: usize = 5;

/// The value sets spanning the scenario grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDimensions {
    pub users: Vec<String>,
    pub applications: Vec<String>,
    pub platforms: Vec<String>,
    pub locations: Vec<String>,
    pub device_states: Vec<String>,
    pub client_types: Vec<String>,
    pub user_risks: Vec<String>,
    pub signin_risks: Vec<String>,
}

impl ScenarioDimensions {
    /// Extract dimensions from a policy set.
    pub fn from_policies(policies: &[CompiledPolicy]) -> Self {
        let mut users = Vec::new();
        let mut applications = Vec::new();
        let mut platforms = Vec::new();

        for policy in policies {
            let conditions = &policy.conditions;
            if let Some(scope) = &conditions.users {
                for user in scope.include_users.iter().flatten() {
                    if user != "All" {
                        push_unique(&mut users, user);
                    }
                }
                for group in scope.include_groups.iter().flatten() {
                    push_unique(&mut users, group);
                }
            }
            if let Some(scope) = &conditions.applications {
                for app in scope.include_applications.iter().flatten() {
                    if app != "All" {
                        push_unique(&mut applications, app);
                    }
                }
            }
            if let Some(scope) = &conditions.platforms {
                for platform in scope.include_platforms.iter().flatten() {
                    push_unique(&mut platforms, platform);
                }
            }
        }

        users.sort();
        users.truncate(MAX_VALUES);
        if users.is_empty() {
            users.push("GenericUser".to_owned());
        }

        applications.sort();
        applications.truncate(MAX_VALUES);
        // A catch-all entry exercises policies scoped to All apps.
        push_unique(&mut applications, "GenericApp");

        platforms.sort();
        platforms.truncate(MAX_VALUES);
        if platforms.is_empty() {
            platforms = ["Windows", "macOS", "iOS", "Android"]
                .map(str::to_owned)
                .to_vec();
        }

        ScenarioDimensions {
            users,
            applications,
            platforms,
            locations: vec!["Trusted".to_owned(), "Untrusted".to_owned()],
            device_states: vec!["Compliant".to_owned(), "Unmanaged".to_owned()],
            client_types: vec![
                "Browser".to_owned(),
                "Mobile/Desktop".to_owned(),
                "Legacy".to_owned(),
            ],
            user_risks: vec!["No Risk".to_owned(), "High".to_owned()],
            signin_risks: vec!["No Risk".to_owned(), "High".to_owned()],
        }
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_owned());
    }
}
