//! Shared AST types for the CAPL compiler.
//!
//! These types are produced by the parser and consumed by the path
//! extractor and the optimizer. They live here so that downstream
//! modules can import them without depending on the parser.

use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Conditions
// ──────────────────────────────────────────────

/// The subject a condition constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    User,
    UserGroup,
    UserRole,
    Application,
    Platform,
    Device,
    Location,
    Client,
    SigninRisk,
    UserRisk,
    /// Condition text that matched no grammar rule. Carries the raw
    /// text as its value and is dropped at record rendering.
    Unknown,
}

/// How a condition's value is compared.
///
/// `IsOr` carries a pipe-delimited set of alternative values and is
/// never negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Is,
    In,
    IsOr,
}

/// A single condition within a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub operator: Operator,
    pub value: String,
    /// Backend object reference (group, role, location, application id).
    pub identifier: Option<String>,
    pub negated: bool,
}

impl Condition {
    pub fn new(kind: ConditionKind, operator: Operator, value: impl Into<String>) -> Self {
        Condition {
            kind,
            operator,
            value: value.into(),
            identifier: None,
            negated: false,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Require,
    Block,
    Allow,
    Session,
}

/// A grant or session directive attached to a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub value: Option<String>,
    /// Marks a `REQUIRE a OR b` action: the pipe-delimited controls in
    /// `value` are alternatives, any one of which satisfies the grant.
    pub alternative: bool,
}

impl Action {
    pub fn require(value: impl Into<String>) -> Self {
        Action {
            kind: ActionKind::Require,
            value: Some(value.into()),
            alternative: false,
        }
    }

    pub fn block() -> Self {
        Action {
            kind: ActionKind::Block,
            value: None,
            alternative: false,
        }
    }

    pub fn allow() -> Self {
        Action {
            kind: ActionKind::Allow,
            value: None,
            alternative: false,
        }
    }

    pub fn session(value: impl Into<String>) -> Self {
        Action {
            kind: ActionKind::Session,
            value: Some(value.into()),
            alternative: false,
        }
    }
}

// ──────────────────────────────────────────────
// Enforcement state
// ──────────────────────────────────────────────

/// Enforcement state of a branch and of the emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PolicyState {
    #[default]
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "report-only")]
    ReportOnly,
}

impl PolicyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyState::Enabled => "enabled",
            PolicyState::Disabled => "disabled",
            PolicyState::ReportOnly => "report-only",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "enabled" => Some(PolicyState::Enabled),
            "disabled" => Some(PolicyState::Disabled),
            "report-only" => Some(PolicyState::ReportOnly),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Decision tree
// ──────────────────────────────────────────────

/// One alternative (`IF` / `ELSE IF` / `ELSE`) within a decision.
///
/// A branch carries its own conditions (AND-ed) and either terminal
/// actions or a nested decision. When both are structurally present,
/// the nested decision is the branch's effective body and the actions
/// are ignored at path extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch {
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub state: PolicyState,
    pub nested: Option<Box<Decision>>,
}

/// A complete `IF ... ELSE IF ... ELSE ... END` construct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub if_branch: Branch,
    pub else_if_branches: Vec<Branch>,
    pub else_branch: Option<Branch>,
}

/// A `VAR` declaration, used only for text substitution prior to
/// condition parsing. Not retained past parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub display_name: String,
    pub identifier: String,
}

// ──────────────────────────────────────────────
// Flat paths
// ──────────────────────────────────────────────

/// One root-to-leaf conjunction of conditions plus its terminal
/// actions and enforcement state.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatPath {
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub state: PolicyState,
}
