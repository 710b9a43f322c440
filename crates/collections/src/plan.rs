//! Set algebra between tracked members and the latest evaluation.

use std::collections::HashSet;

use culler_core::{CollectionMedia, MediaId};

/// What a reconcile pass will change, before any side effect runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Matching items not yet tracked, in evaluation order.
    pub to_add: Vec<MediaId>,
    /// Rule-managed members reported as no longer matching.
    pub to_remove: Vec<MediaId>,
    /// Rule-managed members that became excluded.
    pub to_exclude: Vec<MediaId>,
}

impl ReconcilePlan {
    /// Diff `members` against an evaluation.
    ///
    /// Members absent from both `matched` and `unmatched` are left alone;
    /// they disappeared from the library and belong to the pruning pass.
    /// Manual members are never removed here. `skip` holds ids that must
    /// not be (re)added: those handled this pass or still carrying a
    /// handled marker.
    pub fn compute(
        members: &[CollectionMedia],
        matched: &[&str],
        unmatched: &HashSet<&str>,
        excluded: &HashSet<&str>,
        skip: &HashSet<&str>,
    ) -> Self {
        let tracked: HashSet<&str> = members.iter().map(|m| m.media_id.as_str()).collect();
        let matched_set: HashSet<&str> = matched.iter().copied().collect();

        let mut plan = Self::default();
        let mut seen = HashSet::new();
        for id in matched {
            if tracked.contains(id) || excluded.contains(id) || skip.contains(id) {
                continue;
            }
            if seen.insert(*id) {
                plan.to_add.push(id.to_string());
            }
        }

        for member in members.iter().filter(|m| !m.is_manual) {
            let id = member.media_id.as_str();
            if excluded.contains(id) {
                plan.to_exclude.push(member.media_id.clone());
            } else if unmatched.contains(id) && !matched_set.contains(id) {
                plan.to_remove.push(member.media_id.clone());
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_exclude.is_empty()
    }
}
