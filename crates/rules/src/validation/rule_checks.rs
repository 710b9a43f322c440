//! Structural and type checks for a rule group's rules.

use std::collections::BTreeSet;

use super::ValidationResult;
use crate::evaluator::sections;
use crate::schema::{RuleDefinition, RuleGroup, RuleType};

pub(super) fn validate_header(group: &RuleGroup, result: &mut ValidationResult) {
    if group.name.trim().is_empty() {
        result.error("name", "rule group name must not be empty");
    }
    if group.library_id.trim().is_empty() {
        result.error("libraryId", "libraryId must not be empty");
    }
    if group.use_rules && group.rules.is_empty() {
        result.warn("rules", "rule group has no rules and will never match");
    }
}

pub(super) fn validate_rules(group: &RuleGroup, result: &mut ValidationResult) {
    for chain in sections(&group.rules).into_values() {
        for (position, (index, rule)) in chain.into_iter().enumerate() {
            let path = format!("rules[{}]", index);
            check_operator(&path, position, rule, result);
            check_operands(&path, group, rule, result);
        }
    }

    let used: BTreeSet<u32> = group.rules.iter().map(|r| r.section).collect();
    if let Some(&max) = used.iter().next_back() {
        if used.len() as u32 != max + 1 {
            result.warn("rules", "section numbers are not contiguous");
        }
    }
}

fn check_operator(path: &str, position: usize, rule: &RuleDefinition, result: &mut ValidationResult) {
    match (position, rule.operator) {
        (0, Some(op)) => result.warn(
            format!("{}.operator", path),
            format!("operator '{}' on the first rule of a section is ignored", op),
        ),
        (p, None) if p > 0 => result.error(
            format!("{}.operator", path),
            "every rule after the first in a section needs an operator",
        ),
        _ => {}
    }
}

fn check_operands(path: &str, group: &RuleGroup, rule: &RuleDefinition, result: &mut ValidationResult) {
    let left_type = rule.first_val.rule_type();

    if !rule.first_val.applies_to(group.data_type) {
        result.error(
            format!("{}.firstVal", path),
            format!(
                "'{}' does not apply to {} items",
                rule.first_val.key(),
                group.data_type
            ),
        );
    }

    if !left_type.supports(rule.action) {
        let allowed: Vec<&str> = left_type.comparators().iter().map(|c| c.name()).collect();
        result.error(
            format!("{}.action", path),
            format!(
                "'{}' is not valid for a {} property (expected one of: {})",
                rule.action.name(),
                left_type,
                allowed.join(", ")
            ),
        );
        return;
    }

    let expected = rule.action.right_operand_type(left_type);
    match (&rule.last_val, &rule.custom_val) {
        (Some(_), Some(_)) => result.error(
            path.to_string(),
            "rule has both lastVal and customVal; exactly one is allowed",
        ),
        (None, None) => result.error(
            path.to_string(),
            "rule needs a right operand (lastVal or customVal)",
        ),
        (Some(last), None) => {
            if !compatible(expected, last.rule_type()) {
                result.error(
                    format!("{}.lastVal", path),
                    format!(
                        "'{}' is {}, expected {}",
                        last.key(),
                        last.rule_type(),
                        expected
                    ),
                );
            }
            if !last.applies_to(group.data_type) {
                result.error(
                    format!("{}.lastVal", path),
                    format!("'{}' does not apply to {} items", last.key(), group.data_type),
                );
            }
        }
        (None, Some(custom)) => {
            if !compatible(expected, custom.rule_type_id) {
                result.error(
                    format!("{}.customVal", path),
                    format!("literal is {}, expected {}", custom.rule_type_id, expected),
                );
            } else if let Err(e) = custom.coerce() {
                result.error(format!("{}.customVal", path), e);
            }
        }
    }
}

/// Text and text lists interchange: a single needle against a list and
/// vice versa.
fn compatible(expected: RuleType, actual: RuleType) -> bool {
    expected == actual
        || matches!(
            (expected, actual),
            (RuleType::Text, RuleType::TextList) | (RuleType::TextList, RuleType::Text)
        )
}
