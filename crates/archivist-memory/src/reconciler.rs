// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate-to-profile merging.
//!
//! Candidates are applied one at a time, in input order, to a working copy of
//! the subject's stored facts, so a later candidate sees the effect of an
//! earlier one. Matching rules:
//!
//! - **Singleton keys** hold one value. An equal (or aliased) value reinforces
//!   it; a different value is a conflict settled by recency-weighted confidence.
//! - **Multi-valued keys** hold a set. A duplicate (equal, aliased, or fuzzy
//!   match) reinforces the stored value; anything else is inserted.
//!
//! Reinforcement is skipped when the candidate's newest source message is not
//! newer than the stored fact's `last_confirmed_message_id`. Replaying a
//! message therefore never double-counts.

use std::collections::BTreeSet;

use archivist_core::types::{
    CandidateFact, Cardinality, FactMap, UserFact, collapse_whitespace, normalize_key,
    normalize_value,
};
use tracing::debug;

use crate::policy::ReconcilePolicy;
use crate::types::{
    CandidateOutcome, ConflictRecord, ConflictResolution, MergeOutcome, MergeReport,
    Reconciliation,
};

/// Merges candidate facts into stored profiles.
#[derive(Debug, Clone, Default)]
pub struct FactReconciler {
    policy: ReconcilePolicy,
}

impl FactReconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconciles `candidates` for `subject_user_id` against `existing`.
    ///
    /// Candidates naming a different subject are ignored.
    pub fn reconcile(
        &self,
        subject_user_id: &str,
        candidates: &[CandidateFact],
        existing: &FactMap,
    ) -> Reconciliation {
        let mut working = existing.clone();
        let mut touched: Vec<(String, usize)> = Vec::new();
        let mut report = MergeReport::default();

        for candidate in candidates {
            let key = normalize_key(&candidate.attribute_key);
            let normalized = normalize_value(&candidate.value);
            let display = collapse_whitespace(&candidate.value);

            let usable = !key.is_empty()
                && !normalized.is_empty()
                && !candidate.source_message_ids.is_empty()
                && candidate.confidence.is_finite()
                && candidate.subject_user_id == subject_user_id;
            if !usable {
                report.outcomes.push(CandidateOutcome {
                    attribute_key: key,
                    value: display,
                    outcome: MergeOutcome::Ignored,
                });
                continue;
            }

            let (cardinality, registered) = self.policy.schema.lookup(&key);
            if !registered && !existing.contains_key(&key) {
                report.discovered_keys.insert(key.clone());
            }

            let incoming = Incoming {
                subject_user_id,
                key: &key,
                display: &display,
                normalized: &normalized,
                confidence: candidate.confidence.clamp(0.0, 1.0),
                first_source: candidate.first_source_id(),
                evidence: candidate.evidence_id(),
                cardinality,
            };

            let slot = working.entry(key.clone()).or_default();
            let (outcome, touched_index) = match cardinality {
                Cardinality::Singleton => self.merge_singleton(slot, &incoming, &mut report),
                Cardinality::MultiValued => self.merge_multi_valued(slot, &incoming),
            };

            debug!(
                subject = subject_user_id,
                key = %key,
                value = %incoming.display,
                outcome = %outcome,
                "reconciled candidate"
            );

            if let Some(index) = touched_index {
                let entry = (key.clone(), index);
                if !touched.contains(&entry) {
                    touched.push(entry);
                }
            }
            report.outcomes.push(CandidateOutcome {
                attribute_key: key,
                value: display,
                outcome,
            });
        }

        working.retain(|_, facts| !facts.is_empty());

        let writes = touched
            .iter()
            .filter_map(|(key, index)| working.get(key).and_then(|f| f.get(*index)).cloned())
            .collect();

        Reconciliation { writes, report }
    }

    fn merge_singleton(
        &self,
        slot: &mut Vec<UserFact>,
        incoming: &Incoming<'_>,
        report: &mut MergeReport,
    ) -> (MergeOutcome, Option<usize>) {
        // A key registered as multi-valued earlier may hold several rows;
        // the most recently confirmed one is current.
        let Some(index) = slot
            .iter()
            .enumerate()
            .max_by_key(|(_, f)| f.last_confirmed_message_id)
            .map(|(i, _)| i)
        else {
            slot.push(incoming.to_fact());
            return (MergeOutcome::Inserted, Some(0));
        };

        let current = &mut slot[index];
        let current_norm = current.normalized_value();
        if current_norm == incoming.normalized
            || self.policy.are_aliases(&current_norm, incoming.normalized)
        {
            return reinforce(current, incoming, index);
        }

        let (existing_weight, candidate_weight) =
            match incoming.evidence.cmp(&current.last_confirmed_message_id) {
                std::cmp::Ordering::Greater => (
                    self.policy
                        .recency_weight(incoming.evidence - current.last_confirmed_message_id),
                    1.0,
                ),
                std::cmp::Ordering::Less => (
                    1.0,
                    self.policy
                        .recency_weight(current.last_confirmed_message_id - incoming.evidence),
                ),
                std::cmp::Ordering::Equal => (1.0, 1.0),
            };
        let existing_score = current.confidence * existing_weight;
        let candidate_score = incoming.confidence * candidate_weight;

        let (outcome, resolution, superseded) =
            if (candidate_score - existing_score).abs() <= self.policy.tie_tolerance {
                (MergeOutcome::Unresolved, ConflictResolution::Tie, None)
            } else if candidate_score > existing_score {
                (
                    MergeOutcome::Replaced,
                    ConflictResolution::CandidateWon,
                    Some(current.value.clone()),
                )
            } else {
                (
                    MergeOutcome::Rejected,
                    ConflictResolution::ExistingWon,
                    Some(incoming.display.to_string()),
                )
            };

        report.conflicts.push(ConflictRecord {
            subject_user_id: incoming.subject_user_id.to_string(),
            attribute_key: incoming.key.to_string(),
            existing_value: current.value.clone(),
            existing_confidence: current.confidence,
            existing_message_id: current.last_confirmed_message_id,
            candidate_value: incoming.display.to_string(),
            candidate_confidence: incoming.confidence,
            candidate_message_id: incoming.evidence,
            resolution,
            superseded_value: superseded,
        });

        if outcome == MergeOutcome::Replaced {
            *current = incoming.to_fact();
            (outcome, Some(index))
        } else {
            (outcome, None)
        }
    }

    fn merge_multi_valued(
        &self,
        slot: &mut Vec<UserFact>,
        incoming: &Incoming<'_>,
    ) -> (MergeOutcome, Option<usize>) {
        match self.find_duplicate(slot, incoming.normalized) {
            Some(index) => reinforce(&mut slot[index], incoming, index),
            None => {
                slot.push(incoming.to_fact());
                (MergeOutcome::Inserted, Some(slot.len() - 1))
            }
        }
    }

    /// Exact match first, then alias, then the best fuzzy match.
    fn find_duplicate(&self, slot: &[UserFact], normalized: &str) -> Option<usize> {
        let values: Vec<String> = slot.iter().map(UserFact::normalized_value).collect();

        if let Some(i) = values.iter().position(|v| v == normalized) {
            return Some(i);
        }
        if let Some(i) = values
            .iter()
            .position(|v| self.policy.are_aliases(v, normalized))
        {
            return Some(i);
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, v) in values.iter().enumerate() {
            if let Some(score) = self.policy.fuzzy_score(v, normalized) {
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((i, score));
                }
            }
        }
        best.map(|(i, _)| i)
    }
}

/// A validated candidate in normalized form.
struct Incoming<'a> {
    subject_user_id: &'a str,
    key: &'a str,
    display: &'a str,
    normalized: &'a str,
    confidence: f64,
    first_source: i64,
    evidence: i64,
    cardinality: Cardinality,
}

impl Incoming<'_> {
    fn to_fact(&self) -> UserFact {
        UserFact {
            subject_user_id: self.subject_user_id.to_string(),
            attribute_key: self.key.to_string(),
            value: self.display.to_string(),
            cardinality: self.cardinality,
            confidence: self.confidence,
            first_seen_message_id: self.first_source,
            last_confirmed_message_id: self.evidence,
            confirmation_count: 1,
        }
    }
}

fn reinforce(
    fact: &mut UserFact,
    incoming: &Incoming<'_>,
    index: usize,
) -> (MergeOutcome, Option<usize>) {
    if incoming.evidence <= fact.last_confirmed_message_id {
        return (MergeOutcome::AlreadyApplied, None);
    }

    let blended = fact.confidence + (incoming.confidence - fact.confidence) * incoming.confidence;
    fact.confidence = blended.max(fact.confidence).min(1.0);
    fact.confirmation_count = fact.confirmation_count.saturating_add(1);
    fact.last_confirmed_message_id = incoming.evidence;
    fact.first_seen_message_id = fact.first_seen_message_id.min(incoming.first_source);
    (MergeOutcome::Reinforced, Some(index))
}

/// Keys in `discovered` that are not already known elsewhere.
pub fn new_keys<'a>(
    discovered: impl IntoIterator<Item = &'a String>,
    known: &BTreeSet<String>,
) -> BTreeSet<String> {
    discovered
        .into_iter()
        .filter(|k| !known.contains(*k))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AttributeSchema;

    fn candidate(key: &str, value: &str, confidence: f64, sources: &[i64]) -> CandidateFact {
        CandidateFact {
            subject_user_id: "u1".into(),
            attribute_key: key.into(),
            value: value.into(),
            confidence,
            source_message_ids: sources.iter().copied().collect(),
        }
    }

    fn stored(key: &str, value: &str, cardinality: Cardinality, confidence: f64, at: i64) -> UserFact {
        UserFact {
            subject_user_id: "u1".into(),
            attribute_key: key.into(),
            value: value.into(),
            cardinality,
            confidence,
            first_seen_message_id: at,
            last_confirmed_message_id: at,
            confirmation_count: 1,
        }
    }

    fn facts(list: Vec<UserFact>) -> FactMap {
        let mut map = FactMap::new();
        for f in list {
            map.entry(f.attribute_key.clone()).or_default().push(f);
        }
        map
    }

    #[test]
    fn inserts_into_empty_profile() {
        let r = FactReconciler::default();
        let out = r.reconcile("u1", &[candidate("City", " Paris ", 0.7, &[3, 9])], &FactMap::new());

        assert_eq!(out.writes.len(), 1);
        let fact = &out.writes[0];
        assert_eq!(fact.attribute_key, "city");
        assert_eq!(fact.value, "Paris");
        assert_eq!(fact.first_seen_message_id, 3);
        assert_eq!(fact.last_confirmed_message_id, 9);
        assert_eq!(fact.confirmation_count, 1);
        assert_eq!(out.report.count(MergeOutcome::Inserted), 1);
        assert!(out.report.discovered_keys.is_empty());
    }

    #[test]
    fn newer_confident_value_replaces_singleton() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Paris", Cardinality::Singleton, 0.6, 50)]);
        let out = r.reconcile("u1", &[candidate("city", "Berlin", 0.9, &[120])], &existing);

        assert_eq!(out.writes.len(), 1);
        assert_eq!(out.writes[0].value, "Berlin");
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::Replaced);
        let conflict = &out.report.conflicts[0];
        assert_eq!(conflict.resolution, ConflictResolution::CandidateWon);
        assert_eq!(conflict.superseded_value.as_deref(), Some("Paris"));
        assert_eq!(conflict.existing_message_id, 50);
        assert_eq!(conflict.candidate_message_id, 120);
    }

    #[test]
    fn weak_older_candidate_is_rejected() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Berlin", Cardinality::Singleton, 0.9, 120)]);
        let out = r.reconcile("u1", &[candidate("city", "Paris", 0.6, &[50])], &existing);

        assert!(out.writes.is_empty());
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::Rejected);
        assert_eq!(
            out.report.conflicts[0].superseded_value.as_deref(),
            Some("Paris")
        );
    }

    #[test]
    fn close_scores_are_a_tie() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Paris", Cardinality::Singleton, 0.8, 10)]);
        let out = r.reconcile("u1", &[candidate("city", "Lyon", 0.8, &[10])], &existing);

        assert!(out.writes.is_empty());
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::Unresolved);
        assert_eq!(out.report.conflicts[0].resolution, ConflictResolution::Tie);
        assert_eq!(out.report.conflicts[0].superseded_value, None);
    }

    #[test]
    fn equal_value_reinforces() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Paris", Cardinality::Singleton, 0.5, 10)]);
        let out = r.reconcile("u1", &[candidate("city", "paris", 0.8, &[20])], &existing);

        let fact = &out.writes[0];
        assert_eq!(fact.value, "Paris");
        assert_eq!(fact.confirmation_count, 2);
        assert_eq!(fact.last_confirmed_message_id, 20);
        // 0.5 + (0.8 - 0.5) * 0.8
        assert!((fact.confidence - 0.74).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_confirmation_never_lowers_confidence() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Paris", Cardinality::Singleton, 0.9, 10)]);
        let out = r.reconcile("u1", &[candidate("city", "Paris", 0.2, &[20])], &existing);
        assert!((out.writes[0].confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn replayed_evidence_is_already_applied() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("city", "Paris", Cardinality::Singleton, 0.5, 20)]);
        let out = r.reconcile("u1", &[candidate("city", "Paris", 0.9, &[20])], &existing);

        assert!(out.writes.is_empty());
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::AlreadyApplied);
    }

    #[test]
    fn older_evidence_for_stored_value_changes_nothing() {
        let r = FactReconciler::default();
        let inserted = r.reconcile("u1", &[candidate("interests", "chess", 0.7, &[12])], &FactMap::new());
        assert_eq!(inserted.report.outcomes[0].outcome, MergeOutcome::Inserted);
        let existing = facts(inserted.writes);

        let out = r.reconcile("u1", &[candidate("interests", "Chess", 0.95, &[11])], &existing);
        assert!(out.writes.is_empty());
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::AlreadyApplied);

        let chess = &existing["interests"][0];
        assert_eq!(chess.confirmation_count, 1);
        assert_eq!(chess.last_confirmed_message_id, 12);
        assert!((chess.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn alias_reinforces_multi_valued_value() {
        let policy = ReconcilePolicy::default().with_aliases([vec!["photo", "photography"]]);
        let r = FactReconciler::new(policy);
        let existing = facts(vec![
            stored("interests", "hiking", Cardinality::MultiValued, 0.7, 5),
            stored("interests", "photography", Cardinality::MultiValued, 0.7, 6),
        ]);
        let out = r.reconcile("u1", &[candidate("interests", "photo", 0.8, &[40])], &existing);

        assert_eq!(out.writes.len(), 1);
        assert_eq!(out.writes[0].value, "photography");
        assert_eq!(out.writes[0].confirmation_count, 2);
        assert_eq!(out.report.outcomes[0].outcome, MergeOutcome::Reinforced);
    }

    #[test]
    fn distinct_multi_value_is_inserted() {
        let r = FactReconciler::default();
        let existing = facts(vec![stored("interests", "hiking", Cardinality::MultiValued, 0.7, 5)]);
        let out = r.reconcile("u1", &[candidate("interests", "chess", 0.6, &[8])], &existing);

        assert_eq!(out.writes.len(), 1);
        assert_eq!(out.writes[0].value, "chess");
        assert_eq!(out.writes[0].cardinality, Cardinality::MultiValued);
    }

    #[test]
    fn fuzzy_match_when_enabled() {
        let existing = facts(vec![stored("skills", "javascript", Cardinality::MultiValued, 0.7, 5)]);
        let cand = [candidate("skills", "javascrpt", 0.7, &[9])];

        let strict = FactReconciler::default().reconcile("u1", &cand, &existing);
        assert_eq!(strict.report.outcomes[0].outcome, MergeOutcome::Inserted);

        let fuzzy = FactReconciler::new(ReconcilePolicy::default().with_fuzzy_threshold(0.9))
            .reconcile("u1", &cand, &existing);
        assert_eq!(fuzzy.report.outcomes[0].outcome, MergeOutcome::Reinforced);
        assert_eq!(fuzzy.writes[0].value, "javascript");
    }

    #[test]
    fn later_candidates_see_earlier_ones() {
        let r = FactReconciler::default();
        let out = r.reconcile(
            "u1",
            &[
                candidate("pets", "a cat", 0.6, &[1]),
                candidate("pets", "A  Cat", 0.6, &[2]),
                candidate("pets", "a dog", 0.6, &[2]),
            ],
            &FactMap::new(),
        );

        let outcomes: Vec<_> = out.report.outcomes.iter().map(|o| o.outcome).collect();
        assert_eq!(
            outcomes,
            vec![MergeOutcome::Inserted, MergeOutcome::Reinforced, MergeOutcome::Inserted]
        );
        // The cat row is written once, in first-touch order.
        assert_eq!(out.writes.len(), 2);
        assert_eq!(out.writes[0].value, "a cat");
        assert_eq!(out.writes[0].confirmation_count, 2);
        assert_eq!(out.writes[1].value, "a dog");
    }

    #[test]
    fn unregistered_key_is_discovered_and_singleton() {
        let r = FactReconciler::default();
        let out = r.reconcile(
            "u1",
            &[candidate("Favorite Band", "Radiohead", 0.7, &[4])],
            &FactMap::new(),
        );
        assert!(out.report.discovered_keys.contains("favorite_band"));
        assert_eq!(out.writes[0].cardinality, Cardinality::Singleton);

        let again = r.reconcile(
            "u1",
            &[candidate("favorite band", "Radiohead", 0.7, &[9])],
            &facts(out.writes.clone()),
        );
        assert!(again.report.discovered_keys.is_empty());
    }

    #[test]
    fn empty_or_foreign_candidates_are_ignored() {
        let r = FactReconciler::default();
        let mut foreign = candidate("city", "Oslo", 0.5, &[1]);
        foreign.subject_user_id = "someone-else".into();
        let out = r.reconcile(
            "u1",
            &[candidate("!!", "x", 0.5, &[1]), candidate("city", "   ", 0.5, &[1]), foreign],
            &FactMap::new(),
        );
        assert!(out.writes.is_empty());
        assert_eq!(out.report.count(MergeOutcome::Ignored), 3);
    }

    #[test]
    fn reconcile_is_deterministic() {
        let r = FactReconciler::new(ReconcilePolicy::default().with_fuzzy_threshold(0.9));
        let existing = facts(vec![
            stored("city", "Paris", Cardinality::Singleton, 0.6, 50),
            stored("interests", "hiking", Cardinality::MultiValued, 0.7, 5),
        ]);
        let cands = [
            candidate("city", "Berlin", 0.9, &[120]),
            candidate("interests", "hikng", 0.6, &[121]),
            candidate("mood", "happy", 0.4, &[122]),
        ];
        assert_eq!(
            r.reconcile("u1", &cands, &existing),
            r.reconcile("u1", &cands, &existing)
        );
    }

    #[test]
    fn new_keys_filters_known() {
        let known: BTreeSet<String> = ["hobby".to_string()].into();
        let discovered = vec!["hobby".to_string(), "mood".to_string()];
        let fresh = new_keys(&discovered, &known);
        assert_eq!(fresh.into_iter().collect::<Vec<_>>(), vec!["mood"]);
    }

    #[test]
    fn custom_schema_controls_cardinality() {
        let policy = ReconcilePolicy::new(AttributeSchema::new(["city"], ["languages"]));
        let r = FactReconciler::new(policy);
        let out = r.reconcile(
            "u1",
            &[candidate("languages", "rust", 0.9, &[1]), candidate("languages", "go", 0.9, &[2])],
            &FactMap::new(),
        );
        assert_eq!(out.writes.len(), 2);
        assert!(out.report.discovered_keys.is_empty());
    }
}
