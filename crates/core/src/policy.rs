//! Compiled policy records and their rendering.
//!
//! [`CompiledPolicy`] is the sole durable output of the pipeline: one
//! structured record per cluster, serialized to the persisted YAML
//! encoding. The builders in this module map merged conditions and
//! actions into the backend vocabulary through fixed lookup tables.

use serde::{Deserialize, Serialize};

use crate::ast::{Action, ActionKind, Condition, ConditionKind, Operator, PolicyState};
use crate::error::{CompileError, Diagnostic};

// ──────────────────────────────────────────────
// Record schema
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPolicy {
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    #[serde(rename = "State")]
    pub state: PolicyState,
    #[serde(rename = "Conditions", default)]
    pub conditions: PolicyConditions,
    #[serde(rename = "GrantControls", skip_serializing_if = "Option::is_none", default)]
    pub grant_controls: Option<GrantControls>,
    #[serde(
        rename = "SessionControls",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub session_controls: Option<SessionControls>,
}

impl CompiledPolicy {
    /// Persisted encoding of one record.
    pub fn to_yaml(&self) -> Result<String, CompileError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, CompileError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyConditions {
    #[serde(rename = "Users", skip_serializing_if = "Option::is_none", default)]
    pub users: Option<UserScope>,
    #[serde(
        rename = "Applications",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub applications: Option<ApplicationScope>,
    #[serde(rename = "Platforms", skip_serializing_if = "Option::is_none", default)]
    pub platforms: Option<PlatformScope>,
    #[serde(rename = "Locations", skip_serializing_if = "Option::is_none", default)]
    pub locations: Option<LocationScope>,
    #[serde(
        rename = "ClientAppTypes",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub client_app_types: Option<Vec<String>>,
    #[serde(
        rename = "DeviceStates",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub device_states: Option<DeviceStates>,
    #[serde(
        rename = "SignInRiskLevels",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sign_in_risk_levels: Option<Vec<String>>,
    #[serde(
        rename = "UserRiskLevels",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub user_risk_levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserScope {
    #[serde(
        rename = "IncludeUsers",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_users: Option<Vec<String>>,
    #[serde(
        rename = "IncludeGuestOrExternalUserTypes",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_guest_or_external_user_types: Option<Vec<String>>,
    #[serde(
        rename = "IncludeGroups",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_groups: Option<Vec<String>>,
    #[serde(
        rename = "ExcludeGroups",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub exclude_groups: Option<Vec<String>>,
    #[serde(
        rename = "IncludeRoles",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_roles: Option<Vec<String>>,
}

impl UserScope {
    fn is_empty(&self) -> bool {
        self.include_users.is_none()
            && self.include_guest_or_external_user_types.is_none()
            && self.include_groups.is_none()
            && self.exclude_groups.is_none()
            && self.include_roles.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationScope {
    #[serde(
        rename = "IncludeApplications",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_applications: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformScope {
    #[serde(
        rename = "IncludePlatforms",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_platforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationScope {
    #[serde(
        rename = "IncludeLocations",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub include_locations: Option<Vec<String>>,
    #[serde(
        rename = "ExcludeLocations",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub exclude_locations: Option<Vec<String>>,
}

impl LocationScope {
    fn is_empty(&self) -> bool {
        self.include_locations.is_none() && self.exclude_locations.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceStates {
    #[serde(
        rename = "CompliantDevice",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub compliant_device: Option<bool>,
    #[serde(
        rename = "DomainJoinedDevice",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub domain_joined_device: Option<bool>,
}

impl DeviceStates {
    fn is_empty(&self) -> bool {
        self.compliant_device.is_none() && self.domain_joined_device.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantControls {
    #[serde(rename = "Operator")]
    pub operator: String,
    #[serde(rename = "BuiltInControls")]
    pub built_in_controls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionControls {
    #[serde(
        rename = "SignInFrequency",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub sign_in_frequency: Option<SignInFrequency>,
    #[serde(
        rename = "PersistentBrowser",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub persistent_browser: Option<PersistentBrowser>,
    #[serde(
        rename = "CloudAppSecurity",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub cloud_app_security: Option<CloudAppSecurity>,
    #[serde(
        rename = "ApplicationEnforcedRestrictions",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub application_enforced_restrictions: Option<ApplicationEnforcedRestrictions>,
}

impl SessionControls {
    fn is_empty(&self) -> bool {
        self.sign_in_frequency.is_none()
            && self.persistent_browser.is_none()
            && self.cloud_app_security.is_none()
            && self.application_enforced_restrictions.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInFrequency {
    #[serde(rename = "Value")]
    pub value: u32,
    #[serde(rename = "Type")]
    pub frequency_type: String,
    #[serde(rename = "IsEnabled")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentBrowser {
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "IsEnabled")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAppSecurity {
    #[serde(rename = "CloudAppSecurityType")]
    pub cloud_app_security_type: String,
    #[serde(rename = "IsEnabled")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEnforcedRestrictions {
    #[serde(rename = "IsEnabled")]
    pub is_enabled: bool,
}

// ──────────────────────────────────────────────
// Vocabulary maps
// ──────────────────────────────────────────────

/// Grant control names to backend vocabulary. Unmapped names fall
/// through to lowercase.
pub fn map_grant_control(control: &str) -> String {
    match control {
        "MFA" => "mfa",
        "CompliantDevice" => "compliantDevice",
        "HybridJoined" => "domainJoinedDevice",
        "ApprovedApp" => "approvedApplication",
        "AppProtection" => "compliantApplication",
        "PasswordChange" => "passwordChange",
        other => return other.to_lowercase(),
    }
    .to_owned()
}

/// Client type names to backend vocabulary, deduplicated preserving
/// first-seen order.
pub fn map_client_types(values: &[&str]) -> Vec<String> {
    let mut mapped = Vec::new();
    for value in values {
        let backend = match *value {
            "Browser" => "browser".to_owned(),
            "MobileApp" | "DesktopApp" => "mobileAppsAndDesktopClients".to_owned(),
            "ExchangeActiveSync" => "exchangeActiveSync".to_owned(),
            "Other" => "other".to_owned(),
            other => other.to_lowercase(),
        };
        if !mapped.contains(&backend) {
            mapped.push(backend);
        }
    }
    mapped
}

// ──────────────────────────────────────────────
// Builders
// ──────────────────────────────────────────────

fn push_value(slot: &mut Option<Vec<String>>, value: impl Into<String>) {
    slot.get_or_insert_with(Vec::new).push(value.into());
}

/// Map merged conditions into the structured condition sections.
/// Empty sections are omitted. `unknown` conditions are dropped here;
/// they were already diagnosed at parse time.
pub fn build_conditions(conditions: &[Condition]) -> PolicyConditions {
    let mut users = UserScope::default();
    let mut applications = ApplicationScope::default();
    let mut platforms = PlatformScope::default();
    let mut locations = LocationScope::default();
    let mut device_states = DeviceStates::default();
    let mut client_app_types: Option<Vec<String>> = None;
    let mut sign_in_risk_levels: Option<Vec<String>> = None;
    let mut user_risk_levels: Option<Vec<String>> = None;

    for cond in conditions {
        match cond.kind {
            ConditionKind::User => match cond.value.as_str() {
                "All" => users.include_users = Some(vec!["All".to_owned()]),
                "Guest" => {
                    users.include_guest_or_external_user_types = Some(vec![
                        "internalGuest".to_owned(),
                        "b2bCollaborationGuest".to_owned(),
                    ])
                }
                _ => {}
            },
            ConditionKind::UserGroup => {
                if let Some(id) = &cond.identifier {
                    if cond.negated {
                        push_value(&mut users.exclude_groups, id);
                    } else {
                        push_value(&mut users.include_groups, id);
                    }
                }
            }
            ConditionKind::UserRole => {
                if let Some(id) = &cond.identifier {
                    push_value(&mut users.include_roles, id);
                }
            }
            ConditionKind::Application => match (cond.value.as_str(), &cond.identifier) {
                ("All", _) => {
                    applications.include_applications = Some(vec!["All".to_owned()]);
                }
                ("Office365", _) => {
                    applications.include_applications = Some(vec!["Office365".to_owned()]);
                }
                (_, Some(id)) => push_value(&mut applications.include_applications, id),
                _ => {}
            },
            ConditionKind::Platform => {
                if cond.operator == Operator::IsOr {
                    platforms.include_platforms =
                        Some(cond.value.split('|').map(str::to_owned).collect());
                } else {
                    push_value(&mut platforms.include_platforms, &cond.value);
                }
            }
            ConditionKind::Device => match cond.value.as_str() {
                "Compliant" => device_states.compliant_device = Some(true),
                "HybridJoined" => device_states.domain_joined_device = Some(true),
                _ => {}
            },
            ConditionKind::Location => match (cond.value.as_str(), &cond.identifier) {
                ("Trusted", _) => {
                    if cond.negated {
                        locations.exclude_locations = Some(vec!["AllTrusted".to_owned()]);
                    } else {
                        locations.include_locations = Some(vec!["AllTrusted".to_owned()]);
                    }
                }
                ("All", _) => locations.include_locations = Some(vec!["All".to_owned()]),
                (_, Some(id)) => push_value(&mut locations.include_locations, id),
                _ => {}
            },
            ConditionKind::Client => {
                let values: Vec<&str> = if cond.operator == Operator::IsOr {
                    cond.value.split('|').collect()
                } else {
                    vec![cond.value.as_str()]
                };
                client_app_types = Some(map_client_types(&values));
            }
            ConditionKind::SigninRisk => {
                push_value(&mut sign_in_risk_levels, cond.value.to_lowercase());
            }
            ConditionKind::UserRisk => {
                push_value(&mut user_risk_levels, cond.value.to_lowercase());
            }
            ConditionKind::Unknown => {}
        }
    }

    PolicyConditions {
        users: (!users.is_empty()).then_some(users),
        applications: applications.include_applications.is_some().then_some(applications),
        platforms: platforms.include_platforms.is_some().then_some(platforms),
        locations: (!locations.is_empty()).then_some(locations),
        client_app_types,
        device_states: (!device_states.is_empty()).then_some(device_states),
        sign_in_risk_levels,
        user_risk_levels,
    }
}

/// Map actions to grant controls. Any `block` overrides everything to
/// `{OR, [block]}`; `allow` alone yields no grant controls section.
pub fn build_grant_controls(actions: &[Action]) -> Option<GrantControls> {
    if actions.iter().any(|a| a.kind == ActionKind::Block) {
        return Some(GrantControls {
            operator: "OR".to_owned(),
            built_in_controls: vec!["block".to_owned()],
        });
    }

    let requires: Vec<&Action> = actions
        .iter()
        .filter(|a| a.kind == ActionKind::Require)
        .collect();
    if requires.is_empty() {
        return None;
    }

    let mut controls = Vec::new();
    for action in &requires {
        let value = match &action.value {
            Some(v) => v,
            None => continue,
        };
        for control in value.split('|') {
            let mapped = map_grant_control(control);
            if !controls.contains(&mapped) {
                controls.push(mapped);
            }
        }
    }
    if controls.is_empty() {
        return None;
    }

    let operator = if requires.iter().any(|a| a.alternative) {
        "OR"
    } else {
        "AND"
    };
    Some(GrantControls {
        operator: operator.to_owned(),
        built_in_controls: controls,
    })
}

/// Map session actions through the fixed directive lookup.
/// Unrecognized session text is dropped with a diagnostic.
pub fn build_session_controls(
    actions: &[Action],
) -> (Option<SessionControls>, Vec<Diagnostic>) {
    let mut controls = SessionControls::default();
    let mut diagnostics = Vec::new();

    for action in actions.iter().filter(|a| a.kind == ActionKind::Session) {
        let value = match &action.value {
            Some(v) => v.trim(),
            None => continue,
        };
        if let Some(freq) = parse_signin_frequency(value) {
            controls.sign_in_frequency = Some(freq);
        } else if let Some(mode) = parse_persistent_browser(value) {
            controls.persistent_browser = Some(PersistentBrowser {
                mode,
                is_enabled: true,
            });
        } else if is_cloud_app_monitor(value) {
            controls.cloud_app_security = Some(CloudAppSecurity {
                cloud_app_security_type: "monitorOnly".to_owned(),
                is_enabled: true,
            });
        } else if value.to_lowercase().contains("block-downloads") {
            controls.application_enforced_restrictions =
                Some(ApplicationEnforcedRestrictions { is_enabled: true });
        } else {
            diagnostics.push(Diagnostic::general(format!(
                "unrecognized session directive dropped: {}",
                value
            )));
        }
    }

    ((!controls.is_empty()).then_some(controls), diagnostics)
}

/// `signin-frequency <n> hours|days`
fn parse_signin_frequency(value: &str) -> Option<SignInFrequency> {
    let mut words = value.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("signin-frequency") {
        return None;
    }
    let number: u32 = words.next()?.parse().ok()?;
    let unit = words.next()?.to_lowercase();
    let frequency_type = match unit.as_str() {
        "hour" | "hours" => "hours",
        "day" | "days" => "days",
        _ => return None,
    };
    Some(SignInFrequency {
        value: number,
        frequency_type: frequency_type.to_owned(),
        is_enabled: true,
    })
}

/// `persistent-browser always|never`
fn parse_persistent_browser(value: &str) -> Option<String> {
    let mut words = value.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("persistent-browser") {
        return None;
    }
    let mode = words.next()?.to_lowercase();
    if mode == "always" || mode == "never" {
        Some(mode)
    } else {
        None
    }
}

/// `monitor with CloudAppSecurity`
fn is_cloud_app_monitor(value: &str) -> bool {
    let lowered = value.to_lowercase();
    lowered.contains("monitor") && lowered.contains("cloudappsecurity")
}
