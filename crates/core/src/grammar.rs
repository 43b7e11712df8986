//! Condition and action grammar for CAPL lines.
//!
//! The grammar is matched with hand-rolled prefix/token matching
//! rather than a tokenizer: condition lines are short and flat, and
//! the set of rules is closed. Keywords match case-insensitively;
//! values keep their written case.
//!
//! `parse_condition` and `parse_action` return `None` when no rule
//! matches; the tree parser decides how to degrade (unknown condition
//! with a diagnostic, or a skipped line).

use crate::ast::{Action, Condition, ConditionKind, Operator, Variable};

/// Replace every occurrence of a declared variable name with a
/// literal `"<display_name>" [<identifier>]` fragment.
///
/// Declarations are visible only to text parsed after them, which the
/// caller guarantees by substituting against the table accumulated so
/// far. Multiple variables may appear in one line.
pub fn substitute_variables(text: &str, variables: &[Variable]) -> String {
    let mut out = text.to_owned();
    for var in variables {
        if out.contains(&var.name) {
            let replacement = format!("\"{}\" [{}]", var.display_name, var.identifier);
            out = out.replace(&var.name, &replacement);
        }
    }
    out
}

/// Parse a `name = "display" [identifier]` declaration body (the text
/// after the `VAR` keyword). Returns `None` for malformed shapes.
pub fn parse_variable_declaration(text: &str) -> Option<Variable> {
    let (name, rest) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let (display_name, identifier, tail) = parse_quoted_ref(rest.trim())?;
    if !tail.trim().is_empty() {
        return None;
    }
    Some(Variable {
        name: name.to_owned(),
        display_name,
        identifier,
    })
}

/// Parse a leading `"Name" [identifier]` fragment. Returns the display
/// name, the identifier, and the unconsumed tail.
fn parse_quoted_ref(text: &str) -> Option<(String, String, &str)> {
    let rest = text.strip_prefix('"')?;
    let close = rest.find('"')?;
    let display = &rest[..close];
    let rest = rest[close + 1..].trim_start();
    let rest = rest.strip_prefix('[')?;
    let close = rest.find(']')?;
    let identifier = rest[..close].trim();
    if identifier.is_empty() {
        return None;
    }
    Some((display.to_owned(), identifier.to_owned(), &rest[close + 1..]))
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.find(char::is_whitespace) {
        Some(idx) => Some((&text[..idx], text[idx..].trim_start())),
        None => Some((text, "")),
    }
}

fn eq_keyword(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// Match `<kind-word> is <Value>` against an already-consumed kind.
/// The value must be a single bare word.
fn match_is_value(rest: &str) -> Option<&str> {
    let (is_word, rest) = split_word(rest)?;
    if !eq_keyword(is_word, "is") {
        return None;
    }
    let (value, tail) = split_word(rest)?;
    if !tail.is_empty() || !value.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(value)
}

/// Parse a condition line (variables already substituted).
pub fn parse_condition(text: &str) -> Option<Condition> {
    let text = text.trim();

    // OR-list form: `platform is A OR platform is B` (also client).
    // Checked first so the single-value rule does not swallow the
    // leading segment.
    if text.contains(" OR ") {
        if let Some(cond) = parse_or_list(text) {
            return Some(cond);
        }
    }

    let (kind_word, rest) = split_word(text)?;
    let (negated, rest) = match split_word(rest) {
        Some((word, tail)) if eq_keyword(word, "not") => (true, tail),
        _ => (false, rest),
    };

    match kind_word.to_ascii_lowercase().as_str() {
        "user" => parse_user(rest, negated),
        "app" | "application" => parse_application(rest, negated),
        "platform" => {
            if negated {
                return None;
            }
            let value = match_is_value(rest)?;
            Some(Condition::new(ConditionKind::Platform, Operator::Is, value))
        }
        "device" => {
            let value = match_is_value(rest)?;
            let cond = Condition::new(ConditionKind::Device, Operator::Is, value);
            Some(if negated { cond.negated() } else { cond })
        }
        "location" => parse_location(rest, negated),
        "client" => {
            let value = match_is_value(rest)?;
            let cond = Condition::new(ConditionKind::Client, Operator::Is, value);
            Some(if negated { cond.negated() } else { cond })
        }
        "signin-risk" => {
            if negated {
                return None;
            }
            let value = match_is_value(rest)?;
            Some(Condition::new(ConditionKind::SigninRisk, Operator::Is, value))
        }
        "user-risk" => {
            if negated {
                return None;
            }
            let value = match_is_value(rest)?;
            Some(Condition::new(ConditionKind::UserRisk, Operator::Is, value))
        }
        _ => None,
    }
}

/// `platform is A OR platform is B` and the client equivalent. All
/// segments must repeat the kind keyword; segments that do not parse
/// are dropped from the list.
fn parse_or_list(text: &str) -> Option<Condition> {
    let parts: Vec<&str> = text.split(" OR ").map(str::trim).collect();
    let (first_kind, _) = split_word(parts[0])?;
    let kind = match first_kind.to_ascii_lowercase().as_str() {
        "platform" => ConditionKind::Platform,
        "client" => ConditionKind::Client,
        _ => return None,
    };
    let mut values = Vec::new();
    for part in &parts {
        let (kind_word, rest) = match split_word(part) {
            Some(split) => split,
            None => continue,
        };
        if !eq_keyword(kind_word, first_kind) {
            continue;
        }
        if let Some(value) = match_is_value(rest) {
            values.push(value.to_owned());
        }
    }
    if values.is_empty() {
        return None;
    }
    Some(Condition::new(kind, Operator::IsOr, values.join("|")))
}

fn parse_user(rest: &str, negated: bool) -> Option<Condition> {
    let (op_word, rest) = split_word(rest)?;
    if eq_keyword(op_word, "is") {
        if negated {
            return None;
        }
        let (value, tail) = split_word(rest)?;
        if !tail.is_empty() {
            return None;
        }
        return Some(Condition::new(ConditionKind::User, Operator::Is, value));
    }
    if eq_keyword(op_word, "in") {
        let (container, rest) = split_word(rest)?;
        let kind = if eq_keyword(container, "group") {
            ConditionKind::UserGroup
        } else if eq_keyword(container, "role") {
            ConditionKind::UserRole
        } else {
            return None;
        };
        let (display, identifier, tail) = parse_quoted_ref(rest)?;
        if !tail.trim().is_empty() {
            return None;
        }
        let cond = Condition::new(kind, Operator::In, display).with_identifier(identifier);
        return Some(if negated { cond.negated() } else { cond });
    }
    None
}

fn parse_application(rest: &str, negated: bool) -> Option<Condition> {
    if negated {
        return None;
    }
    let (op_word, rest) = split_word(rest)?;
    if eq_keyword(op_word, "is") {
        let (value, tail) = split_word(rest)?;
        if !tail.is_empty() {
            return None;
        }
        return Some(Condition::new(
            ConditionKind::Application,
            Operator::Is,
            value,
        ));
    }
    if eq_keyword(op_word, "in") {
        let (display, identifier, tail) = parse_quoted_ref(rest)?;
        if !tail.trim().is_empty() {
            return None;
        }
        return Some(
            Condition::new(ConditionKind::Application, Operator::In, display)
                .with_identifier(identifier),
        );
    }
    None
}

fn parse_location(rest: &str, negated: bool) -> Option<Condition> {
    let (op_word, rest) = split_word(rest)?;
    if eq_keyword(op_word, "is") {
        let (value, tail) = split_word(rest)?;
        if !tail.is_empty() {
            return None;
        }
        let cond = Condition::new(ConditionKind::Location, Operator::Is, value);
        return Some(if negated { cond.negated() } else { cond });
    }
    if eq_keyword(op_word, "in") {
        if negated {
            return None;
        }
        let (display, identifier, tail) = parse_quoted_ref(rest)?;
        if !tail.trim().is_empty() {
            return None;
        }
        return Some(
            Condition::new(ConditionKind::Location, Operator::In, display)
                .with_identifier(identifier),
        );
    }
    None
}

/// Parse an action line. Action keywords are case-sensitive uppercase.
pub fn parse_action(text: &str) -> Option<Action> {
    let text = text.trim();
    if text == "BLOCK" {
        return Some(Action::block());
    }
    if text == "ALLOW" {
        return Some(Action::allow());
    }
    if let Some(rest) = text.strip_prefix("REQUIRE ") {
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        if rest.contains(" OR ") {
            let controls: Vec<&str> = rest.split(" OR ").map(str::trim).collect();
            let mut action = Action::require(controls.join("|"));
            action.alternative = true;
            return Some(action);
        }
        return Some(Action::require(rest));
    }
    if let Some(rest) = text.strip_prefix("SESSION ") {
        let rest = rest.trim();
        if rest.is_empty() {
            return None;
        }
        return Some(Action::session(rest));
    }
    None
}
