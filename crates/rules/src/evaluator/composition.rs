//! Section composition for rule groups.
//!
//! Rules are partitioned by `section`. Inside a section they fold left to
//! right with each rule's own operator (the first rule's operator is
//! ignored). Sections are OR'd. Both levels short-circuit, and a rule whose
//! result cannot change the outcome is never evaluated, so its operands are
//! never resolved.

use std::collections::BTreeMap;
use std::future::Future;

use crate::schema::{Operator, RuleDefinition};

/// Rules grouped by section number, ascending. Each entry keeps the rule's
/// index in the original list.
pub fn sections(rules: &[RuleDefinition]) -> BTreeMap<u32, Vec<(usize, &RuleDefinition)>> {
    let mut out: BTreeMap<u32, Vec<(usize, &RuleDefinition)>> = BTreeMap::new();
    for (index, rule) in rules.iter().enumerate() {
        out.entry(rule.section).or_default().push((index, rule));
    }
    out
}

/// Evaluate a rule group lazily.
///
/// `eval` is called with `(index, rule)` only for rules whose result is
/// needed. An empty rule list never matches.
pub async fn evaluate_sections<'r, F, Fut>(rules: &'r [RuleDefinition], mut eval: F) -> bool
where
    F: FnMut(usize, &'r RuleDefinition) -> Fut,
    Fut: Future<Output = bool>,
{
    for chain in sections(rules).into_values() {
        let mut acc: Option<bool> = None;
        for (index, rule) in chain {
            acc = Some(match (acc, rule.operator) {
                (None, _) => eval(index, rule).await,
                (Some(false), Some(Operator::And) | None) => false,
                (Some(true), Some(Operator::And) | None) => eval(index, rule).await,
                (Some(true), Some(Operator::Or)) => true,
                (Some(false), Some(Operator::Or)) => eval(index, rule).await,
            });
        }
        if acc == Some(true) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use std::cell::RefCell;

    fn rule(section: u32, operator: Option<Operator>) -> RuleDefinition {
        RuleDefinition {
            operator,
            action: Comparator::Equals,
            first_val: RuleProperty::Plex(PlexProperty::Title),
            last_val: None,
            custom_val: Some(CustomValue::new(RuleType::Text, "x")),
            section,
        }
    }

    /// Evaluate with fixed per-rule outcomes, recording which rules ran.
    async fn run(rules: &[RuleDefinition], outcomes: &[bool]) -> (bool, Vec<usize>) {
        let called = RefCell::new(Vec::new());
        let result = evaluate_sections(rules, |i, _| {
            called.borrow_mut().push(i);
            let outcome = outcomes[i];
            async move { outcome }
        })
        .await;
        (result, called.into_inner())
    }

    #[tokio::test]
    async fn and_chain_short_circuits_on_false() {
        let rules = vec![rule(0, None), rule(0, Some(Operator::And)), rule(0, Some(Operator::And))];
        let (matched, called) = run(&rules, &[false, true, true]).await;
        assert!(!matched);
        assert_eq!(called, vec![0]);

        let (matched, called) = run(&rules, &[true, true, true]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn or_chain_short_circuits_on_true() {
        let rules = vec![rule(0, None), rule(0, Some(Operator::Or))];
        let (matched, called) = run(&rules, &[true, false]).await;
        assert!(matched);
        assert_eq!(called, vec![0]);

        let (matched, called) = run(&rules, &[false, true]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 1]);
    }

    #[tokio::test]
    async fn chain_folds_left_to_right_without_precedence() {
        // (false OR true) AND false == false
        let rules = vec![rule(0, None), rule(0, Some(Operator::Or)), rule(0, Some(Operator::And))];
        let (matched, _) = run(&rules, &[false, true, false]).await;
        assert!(!matched);

        // (true AND false) OR true == true
        let rules = vec![rule(0, None), rule(0, Some(Operator::And)), rule(0, Some(Operator::Or))];
        let (matched, called) = run(&rules, &[true, false, true]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn sections_are_ored_and_stop_at_first_match() {
        // [{r0 AND r1}, {r2}]
        let rules = vec![rule(0, None), rule(0, Some(Operator::And)), rule(1, None)];

        let (matched, called) = run(&rules, &[true, true, false]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 1]);

        let (matched, called) = run(&rules, &[false, true, true]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 2]);

        let (matched, _) = run(&rules, &[false, true, false]).await;
        assert!(!matched);
    }

    #[tokio::test]
    async fn first_operator_of_a_section_is_ignored() {
        let rules = vec![rule(0, Some(Operator::Or)), rule(1, Some(Operator::And))];
        let (matched, called) = run(&rules, &[false, true]).await;
        assert!(matched);
        assert_eq!(called, vec![0, 1]);
    }

    #[tokio::test]
    async fn empty_group_never_matches() {
        let (matched, called) = run(&[], &[]).await;
        assert!(!matched);
        assert!(called.is_empty());
    }

    #[test]
    fn sections_sorted_and_keep_indices() {
        let rules = vec![rule(3, None), rule(1, None), rule(3, Some(Operator::And))];
        let grouped = sections(&rules);
        let keys: Vec<_> = grouped.keys().copied().collect();
        assert_eq!(keys, vec![1, 3]);
        let indices: Vec<_> = grouped[&3].iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
