//! Indentation-sensitive tree parser for CAPL source text.
//!
//! Converts an ordered sequence of lines into zero or more top-level
//! [`Decision`] trees plus the diagnostics collected along the way.
//! Parsing is permissive by design: an unparseable condition becomes a
//! `kind=unknown` condition with a diagnostic, an unparseable action
//! line is dropped with a diagnostic, a malformed `VAR` declaration is
//! silently dropped, and indentation is advisory (a block's body is
//! any run of lines at strictly greater indentation than the block's
//! header).

use crate::ast::{Branch, Decision, PolicyState, Variable};
use crate::error::Diagnostic;
use crate::grammar;
use crate::lines::{scan, Cursor, SourceLine};

/// Result of parsing one source file.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub decisions: Vec<Decision>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse one CAPL source file. `file` is used for diagnostics only.
pub fn parse_source(file: &str, src: &str) -> ParseOutcome {
    let mut parser = Parser::new(file, src);
    let decisions = parser.parse_file();
    ParseOutcome {
        decisions,
        diagnostics: parser.diagnostics,
    }
}

/// Structural keywords that terminate condition or body collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    If,
    ElseIf,
    Else,
    State,
    End,
}

fn keyword(text: &str) -> Option<Keyword> {
    if text == "END" {
        Some(Keyword::End)
    } else if text == "ELSE" {
        Some(Keyword::Else)
    } else if text == "ELSE IF" || text.starts_with("ELSE IF ") {
        Some(Keyword::ElseIf)
    } else if text == "IF" || text.starts_with("IF ") {
        Some(Keyword::If)
    } else if text == "STATE" || text.starts_with("STATE ") {
        Some(Keyword::State)
    } else {
        None
    }
}

struct Parser {
    cursor: Cursor,
    file: String,
    /// Variable table in declaration order; scoped to this file.
    variables: Vec<Variable>,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn new(file: &str, src: &str) -> Self {
        Parser {
            cursor: Cursor::new(scan(src)),
            file: file.to_owned(),
            variables: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn parse_file(&mut self) -> Vec<Decision> {
        let mut decisions = Vec::new();
        while let Some(line) = self.cursor.peek() {
            if line.text == "VAR" || line.text.starts_with("VAR ") {
                self.parse_variable();
            } else if keyword(&line.text) == Some(Keyword::If) {
                let indent = line.indent;
                decisions.push(self.parse_decision(indent));
            } else {
                // Stray line outside any decision; skipped like the
                // surrounding whitespace.
                self.cursor.advance();
            }
        }
        decisions
    }

    /// `VAR name = "display" [identifier]`. Malformed declarations are
    /// dropped without a diagnostic; the cursor still advances.
    fn parse_variable(&mut self) {
        if let Some(line) = self.cursor.peek() {
            let body = line.text.trim_start_matches("VAR").trim_start();
            if let Some(var) = grammar::parse_variable_declaration(body) {
                self.variables.push(var);
            }
        }
        self.cursor.advance();
    }

    /// Parse a full `IF ... ELSE IF ... ELSE ... END` construct whose
    /// `IF` header sits at `base_indent`.
    fn parse_decision(&mut self, base_indent: usize) -> Decision {
        let mut decision = Decision {
            if_branch: self.parse_branch(base_indent),
            ..Decision::default()
        };
        while let Some(line) = self.cursor.peek() {
            if line.indent < base_indent {
                // Terminators at shallower indentation belong to an
                // enclosing construct.
                break;
            }
            match keyword(&line.text) {
                Some(Keyword::ElseIf) => {
                    decision
                        .else_if_branches
                        .push(self.parse_branch(base_indent));
                }
                Some(Keyword::Else) => {
                    self.cursor.advance();
                    let branch = self.parse_branch_body(base_indent, Branch::default());
                    decision.else_branch = Some(branch);
                }
                Some(Keyword::End) => {
                    self.cursor.advance();
                    break;
                }
                _ => break,
            }
        }
        decision
    }

    /// Parse an `IF` or `ELSE IF` branch: the header condition, any
    /// additional condition lines, then the body.
    fn parse_branch(&mut self, base_indent: usize) -> Branch {
        let mut branch = Branch::default();

        if let Some(line) = self.cursor.peek() {
            let rest = line
                .text
                .strip_prefix("ELSE IF")
                .or_else(|| line.text.strip_prefix("IF"))
                .unwrap_or("")
                .trim()
                .to_owned();
            let number = line.number;
            self.cursor.advance();
            if !rest.is_empty() {
                self.push_condition(&rest, number, &mut branch);
            }
        }

        // Additional conditions: lines at the header's indentation or
        // deeper, up to the first structural keyword.
        while let Some(line) = self.cursor.peek() {
            if line.indent < base_indent || keyword(&line.text).is_some() {
                break;
            }
            let SourceLine { number, text, .. } = line.clone();
            self.cursor.advance();
            self.push_condition(&text, number, &mut branch);
        }

        self.parse_branch_body(base_indent, branch)
    }

    /// Parse a branch body: an optional `STATE` line switching into
    /// action collection, then actions and/or a nested decision, until
    /// indentation returns to the header level or a sibling keyword.
    fn parse_branch_body(&mut self, header_indent: usize, mut branch: Branch) -> Branch {
        if let Some(line) = self.cursor.peek() {
            if keyword(&line.text) == Some(Keyword::State) {
                let value = line.text.trim_start_matches("STATE").trim().to_owned();
                let number = line.number;
                match PolicyState::parse(&value) {
                    Some(state) => branch.state = state,
                    None => self.diagnostics.push(Diagnostic::at(
                        &self.file,
                        number,
                        format!("unknown enforcement state '{}', defaulting to enabled", value),
                    )),
                }
                self.cursor.advance();
            }
        }

        while let Some(line) = self.cursor.peek() {
            if line.indent <= header_indent {
                break;
            }
            match keyword(&line.text) {
                Some(Keyword::ElseIf) | Some(Keyword::Else) | Some(Keyword::End) => break,
                Some(Keyword::If) => {
                    let indent = line.indent;
                    let nested = self.parse_decision(indent);
                    branch.nested = Some(Box::new(nested));
                }
                _ => {
                    match grammar::parse_action(&line.text) {
                        Some(action) => branch.actions.push(action),
                        None => self.diagnostics.push(Diagnostic::at(
                            &self.file,
                            line.number,
                            format!("could not parse action: {}", line.text),
                        )),
                    }
                    self.cursor.advance();
                }
            }
        }
        branch
    }

    /// Substitute variables and parse one condition line. Text that
    /// matches no grammar rule degrades to an `unknown` condition.
    fn push_condition(&mut self, text: &str, number: u32, branch: &mut Branch) {
        use crate::ast::{Condition, ConditionKind, Operator};

        let substituted = grammar::substitute_variables(text, &self.variables);
        match grammar::parse_condition(&substituted) {
            Some(cond) => branch.conditions.push(cond),
            None => {
                self.diagnostics.push(Diagnostic::at(
                    &self.file,
                    number,
                    format!("could not parse condition: {}", substituted),
                ));
                branch.conditions.push(Condition::new(
                    ConditionKind::Unknown,
                    Operator::Is,
                    substituted,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ActionKind, ConditionKind, Operator};

    fn parse(src: &str) -> ParseOutcome {
        parse_source("test.capl", src)
    }

    #[test]
    fn single_decision_with_state_and_action() {
        let outcome = parse("IF platform is Windows\n    STATE enabled\n        REQUIRE MFA\nEND\n");
        assert_eq!(outcome.decisions.len(), 1);
        assert!(outcome.diagnostics.is_empty());
        let branch = &outcome.decisions[0].if_branch;
        assert_eq!(branch.conditions.len(), 1);
        assert_eq!(branch.conditions[0].kind, ConditionKind::Platform);
        assert_eq!(branch.state, PolicyState::Enabled);
        assert_eq!(branch.actions.len(), 1);
        assert_eq!(branch.actions[0].kind, ActionKind::Require);
    }

    #[test]
    fn additional_condition_lines_are_anded() {
        let outcome = parse(
            "IF user is All\n    location NOT is Trusted\n    STATE enabled\n        REQUIRE MFA\nEND\n",
        );
        let branch = &outcome.decisions[0].if_branch;
        assert_eq!(branch.conditions.len(), 2);
        assert_eq!(branch.conditions[1].kind, ConditionKind::Location);
        assert!(branch.conditions[1].negated);
    }

    #[test]
    fn else_if_and_else_branches() {
        let outcome = parse(
            "IF platform is Windows\n    STATE enabled\n        REQUIRE MFA\n\
             ELSE IF platform is macOS\n    STATE enabled\n        REQUIRE CompliantDevice\n\
             ELSE\n    STATE enabled\n        BLOCK\nEND\n",
        );
        let decision = &outcome.decisions[0];
        assert_eq!(decision.else_if_branches.len(), 1);
        assert_eq!(
            decision.else_if_branches[0].conditions[0].value,
            "macOS"
        );
        let else_branch = decision.else_branch.as_ref().unwrap();
        assert!(else_branch.conditions.is_empty());
        assert_eq!(else_branch.actions[0].kind, ActionKind::Block);
    }

    #[test]
    fn nested_decision_replaces_branch_body() {
        let outcome = parse(
            "IF platform is Android\n    IF device is Compliant\n        STATE enabled\n            REQUIRE CompliantDevice\n    ELSE\n        STATE enabled\n            BLOCK\n    END\nEND\n",
        );
        assert_eq!(outcome.decisions.len(), 1);
        let branch = &outcome.decisions[0].if_branch;
        let nested = branch.nested.as_ref().expect("nested decision");
        assert_eq!(nested.if_branch.conditions[0].kind, ConditionKind::Device);
        assert!(nested.else_branch.is_some());
        // Outer branch conditions are not copied into the nested tree;
        // inheritance happens at path extraction.
        assert!(nested.if_branch.conditions.len() == 1);
    }

    #[test]
    fn state_sets_enforcement_mode() {
        let outcome = parse("IF user is All\n    STATE report-only\n        BLOCK\nEND\n");
        assert_eq!(
            outcome.decisions[0].if_branch.state,
            PolicyState::ReportOnly
        );
    }

    #[test]
    fn unknown_state_keeps_default_with_diagnostic() {
        let outcome = parse("IF user is All\n    STATE sometimes\n        BLOCK\nEND\n");
        assert_eq!(outcome.decisions[0].if_branch.state, PolicyState::Enabled);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("sometimes"));
        assert_eq!(outcome.diagnostics[0].line, Some(2));
    }

    #[test]
    fn unknown_condition_collects_diagnostic_and_continues() {
        let outcome = parse(
            "IF gibberish here\n    user is All\n    STATE enabled\n        REQUIRE MFA\nEND\n",
        );
        let branch = &outcome.decisions[0].if_branch;
        assert_eq!(branch.conditions.len(), 2);
        assert_eq!(branch.conditions[0].kind, ConditionKind::Unknown);
        assert_eq!(branch.conditions[0].value, "gibberish here");
        assert_eq!(branch.conditions[1].kind, ConditionKind::User);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].file.as_deref(), Some("test.capl"));
    }

    #[test]
    fn misspelled_action_is_dropped_with_diagnostic() {
        let outcome = parse(
            "IF user is All\n    STATE enabled\n        REQUIER MFA\n        REQUIRE MFA\nEND\n",
        );
        let branch = &outcome.decisions[0].if_branch;
        assert_eq!(branch.actions.len(), 1);
        assert_eq!(branch.actions[0].value.as_deref(), Some("MFA"));
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("REQUIER MFA"));
        assert_eq!(outcome.diagnostics[0].line, Some(3));
    }

    #[test]
    fn variable_substitution_is_forward_only() {
        let outcome = parse(
            "IF user in group Execs\n    STATE enabled\n        BLOCK\nEND\n\
             VAR Execs = \"Executives\" [e-1]\n\
             IF user in group Execs\n    STATE enabled\n        BLOCK\nEND\n",
        );
        assert_eq!(outcome.decisions.len(), 2);
        // Before the declaration the name matches no rule.
        assert_eq!(
            outcome.decisions[0].if_branch.conditions[0].kind,
            ConditionKind::Unknown
        );
        // After the declaration it resolves to a group reference.
        let cond = &outcome.decisions[1].if_branch.conditions[0];
        assert_eq!(cond.kind, ConditionKind::UserGroup);
        assert_eq!(cond.identifier.as_deref(), Some("e-1"));
    }

    #[test]
    fn malformed_variable_declaration_is_silently_dropped() {
        let outcome = parse("VAR broken declaration\nIF user is All\n    STATE enabled\n        ALLOW\nEND\n");
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.decisions.len(), 1);
    }

    #[test]
    fn comments_and_blanks_skipped_at_any_depth() {
        let outcome = parse(
            "# header comment\nIF user is All\n    # between conditions\n    location is Trusted\n\n    STATE enabled\n        # between actions\n        REQUIRE MFA\nEND\n",
        );
        let branch = &outcome.decisions[0].if_branch;
        assert_eq!(branch.conditions.len(), 2);
        assert_eq!(branch.actions.len(), 1);
    }

    #[test]
    fn multiple_top_level_decisions() {
        let outcome = parse(
            "IF platform is Windows\n    STATE enabled\n        BLOCK\nEND\n\
             IF platform is macOS\n    STATE enabled\n        ALLOW\nEND\n",
        );
        assert_eq!(outcome.decisions.len(), 2);
    }

    #[test]
    fn missing_end_closes_at_dedent() {
        // Indentation returning to the header level implicitly ends the
        // body even without END.
        let outcome = parse(
            "IF platform is Windows\n    STATE enabled\n        BLOCK\nIF platform is macOS\n    STATE enabled\n        ALLOW\nEND\n",
        );
        assert_eq!(outcome.decisions.len(), 2);
        assert_eq!(outcome.decisions[0].if_branch.actions[0].kind, ActionKind::Block);
        assert_eq!(outcome.decisions[1].if_branch.actions[0].kind, ActionKind::Allow);
    }

    #[test]
    fn actions_collected_in_encounter_order() {
        let outcome = parse(
            "IF user is All\n    STATE enabled\n        REQUIRE MFA\n        REQUIRE CompliantDevice\n        SESSION block-downloads\nEND\n",
        );
        let actions = &outcome.decisions[0].if_branch.actions;
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].value.as_deref(), Some("MFA"));
        assert_eq!(actions[1].value.as_deref(), Some("CompliantDevice"));
        assert_eq!(actions[2].kind, ActionKind::Session);
    }

    #[test]
    fn or_condition_on_if_header() {
        let outcome = parse(
            "IF platform is iOS OR platform is Android\n    STATE enabled\n        REQUIRE AppProtection\nEND\n",
        );
        let cond = &outcome.decisions[0].if_branch.conditions[0];
        assert_eq!(cond.operator, Operator::IsOr);
        assert_eq!(cond.value, "iOS|Android");
    }

    #[test]
    fn empty_input_yields_no_decisions() {
        let outcome = parse("# only comments\n\n");
        assert!(outcome.decisions.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }
}
