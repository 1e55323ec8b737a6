// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation results.

use std::collections::BTreeSet;

use archivist_core::types::UserFact;
use serde::Serialize;
use strum::{Display, EnumString};

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Stored as a new fact.
    Inserted,
    /// Matched a stored fact and raised its confirmation count.
    Reinforced,
    /// Matched a stored fact already confirmed by this or newer evidence.
    AlreadyApplied,
    /// Won a singleton conflict and replaced the stored value.
    Replaced,
    /// Lost a singleton conflict.
    Rejected,
    /// Singleton conflict within tie tolerance; stored value kept.
    Unresolved,
    /// Key or value empty after normalization.
    Ignored,
}

/// How a singleton conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// The candidate replaced the stored value.
    CandidateWon,
    /// The stored value was kept.
    ExistingWon,
    /// Scores were within tie tolerance; the stored value was kept.
    Tie,
}

/// A singleton conflict, kept for the run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub subject_user_id: String,
    pub attribute_key: String,
    pub existing_value: String,
    pub existing_confidence: f64,
    pub existing_message_id: i64,
    pub candidate_value: String,
    pub candidate_confidence: f64,
    pub candidate_message_id: i64,
    pub resolution: ConflictResolution,
    /// The losing value; `None` for a tie.
    pub superseded_value: Option<String>,
}

/// Outcome for one input candidate, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateOutcome {
    /// Normalized attribute key.
    pub attribute_key: String,
    /// Display form of the candidate value.
    pub value: String,
    pub outcome: MergeOutcome,
}

/// Everything a reconciliation decided besides the writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub outcomes: Vec<CandidateOutcome>,
    pub conflicts: Vec<ConflictRecord>,
    /// Unregistered keys the subject had no facts for.
    pub discovered_keys: BTreeSet<String>,
}

impl MergeReport {
    /// Number of candidates that ended with `outcome`.
    pub fn count(&self, outcome: MergeOutcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}

/// Result of reconciling one subject's candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Final state of every fact touched, in first-touch order.
    pub writes: Vec<UserFact>,
    pub report: MergeReport,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }
}
