//! Rule expression evaluator.
//!
//! Two layers:
//! - **Comparators** ([`evaluate_rule`]): one rule against a pair of
//!   resolved operands. Unresolved or incomparable operands fail closed.
//! - **Composition** ([`evaluate_sections`]): AND/OR chains inside a section,
//!   sections OR'd, evaluated lazily with short-circuiting.

mod comparators;
mod composition;

use chrono::{DateTime, Utc};

use crate::schema::{RuleDefinition, RuleValue};

pub use composition::{evaluate_sections, sections};

/// Evaluate one rule against its resolved operands.
///
/// Returns `false` whenever an operand is missing or the pair is not
/// comparable, for negated comparators too. Never panics.
pub fn evaluate_rule(
    rule: &RuleDefinition,
    left: Option<&RuleValue>,
    right: Option<&RuleValue>,
    now: DateTime<Utc>,
) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => comparators::compare(rule.action, l, r, now).unwrap_or(false),
        _ => false,
    }
}

/// Coerce a rule's literal right operand, if it has one.
///
/// A literal that does not coerce to its declared type is treated as
/// unresolved.
pub fn literal_operand(rule: &RuleDefinition) -> Option<RuleValue> {
    let custom = rule.custom_val.as_ref()?;
    match custom.coerce() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "literal operand does not coerce");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn rating_above(n: &str) -> RuleDefinition {
        RuleDefinition::literal(
            0,
            RuleProperty::Plex(PlexProperty::UserRating),
            Comparator::Bigger,
            CustomValue::new(RuleType::Number, n),
        )
    }

    #[test]
    fn missing_left_fails_closed() {
        let rule = rating_above("7");
        let right = literal_operand(&rule);
        assert!(!evaluate_rule(&rule, None, right.as_ref(), now()));
    }

    #[test]
    fn negated_comparator_fails_closed_too() {
        let rule = RuleDefinition::literal(
            0,
            RuleProperty::Plex(PlexProperty::Genre),
            Comparator::NotContains,
            CustomValue::new(RuleType::Text, "Horror"),
        );
        let right = literal_operand(&rule);
        assert!(!evaluate_rule(&rule, None, right.as_ref(), now()));
        let left = RuleValue::TextList(vec!["Drama".into()]);
        assert!(evaluate_rule(&rule, Some(&left), right.as_ref(), now()));
    }

    #[test]
    fn bad_literal_is_unresolved() {
        let rule = rating_above("seven");
        assert!(literal_operand(&rule).is_none());
        let left = RuleValue::Number(9.0);
        assert!(!evaluate_rule(&rule, Some(&left), None, now()));
    }

    #[test]
    fn type_mismatch_is_false_not_panic() {
        let rule = rating_above("7");
        let right = literal_operand(&rule);
        let left = RuleValue::Text("8".into());
        assert!(!evaluate_rule(&rule, Some(&left), right.as_ref(), now()));
    }

    #[test]
    fn literal_comparison() {
        let rule = rating_above("7");
        let right = literal_operand(&rule);
        assert!(evaluate_rule(&rule, Some(&RuleValue::Number(8.0)), right.as_ref(), now()));
        assert!(!evaluate_rule(&rule, Some(&RuleValue::Number(3.0)), right.as_ref(), now()));
    }
}
