// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the pipeline stages and adapter traits.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ArchivistError;

/// Current on-disk layout version of [`ProcessingCheckpoint`].
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// A single chat message as produced by a transcript parser.
///
/// Immutable once parsed; the pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, monotonically increasing id within one chat.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Sender id; `None` for deleted accounts and anonymous admins.
    pub sender_id: Option<String>,
    /// Display name of the sender at export time.
    pub sender_name: Option<String>,
    /// Flattened plain text.
    pub text: String,
    pub reply_to_id: Option<i64>,
    /// Service records (joins, pins, title changes).
    pub is_service: bool,
}

/// An exported chat: identity plus its ordered messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub chat_id: i64,
    pub name: String,
    /// Export chat type, e.g. `private_group` or `personal_chat`.
    pub chat_type: String,
    pub messages: Vec<Message>,
}

impl Transcript {
    /// Highest message id in the transcript, or 0 for an empty chat.
    pub fn max_message_id(&self) -> i64 {
        self.messages.iter().map(|m| m.id).max().unwrap_or(0)
    }
}

/// Bounded conversational context around one target message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    /// The message the window was built for.
    pub target_id: i64,
    /// Deduplicated messages in id order. Always contains the target.
    pub messages: Vec<Message>,
}

impl ContextWindow {
    /// Returns the target message.
    pub fn target(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == self.target_id)
    }

    /// Ids of every message in the window, in order.
    pub fn ids(&self) -> Vec<i64> {
        self.messages.iter().map(|m| m.id).collect()
    }
}

/// An attribute/value pair proposed by the extractor for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFact {
    pub subject_user_id: String,
    pub attribute_key: String,
    pub value: String,
    /// Extractor confidence in `[0, 1]`.
    pub confidence: f64,
    /// Messages the fact was read from. Never empty after validation.
    pub source_message_ids: BTreeSet<i64>,
}

impl CandidateFact {
    /// Checks the candidate is well-formed.
    ///
    /// A failure here is a permanent extraction failure: retrying the same
    /// window would produce the same malformed output.
    pub fn validate(&self) -> Result<(), ArchivistError> {
        let invalid = |why: &str| ArchivistError::PermanentExtraction {
            message: format!(
                "invalid candidate `{}` for {}: {why}",
                self.attribute_key, self.subject_user_id
            ),
        };

        if self.subject_user_id.trim().is_empty() {
            return Err(invalid("empty subject"));
        }
        if normalize_key(&self.attribute_key).is_empty() {
            return Err(invalid("empty attribute key"));
        }
        if normalize_value(&self.value).is_empty() {
            return Err(invalid("empty value"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid(&format!("confidence {} outside [0, 1]", self.confidence)));
        }
        if self.source_message_ids.is_empty() {
            return Err(invalid("no source messages"));
        }
        Ok(())
    }

    /// The newest message backing this candidate.
    pub fn evidence_id(&self) -> i64 {
        self.source_message_ids.iter().next_back().copied().unwrap_or(0)
    }

    /// The oldest message backing this candidate.
    pub fn first_source_id(&self) -> i64 {
        self.source_message_ids.iter().next().copied().unwrap_or(0)
    }
}

/// Whether an attribute holds one current value or a set of values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Singleton,
    MultiValued,
}

/// A persisted profile fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub subject_user_id: String,
    /// Normalized attribute key.
    pub attribute_key: String,
    /// Display form of the value (trimmed, whitespace collapsed, case kept).
    pub value: String,
    pub cardinality: Cardinality,
    pub confidence: f64,
    pub first_seen_message_id: i64,
    pub last_confirmed_message_id: i64,
    pub confirmation_count: u32,
}

impl UserFact {
    /// Normalized value used for equality and storage uniqueness.
    pub fn normalized_value(&self) -> String {
        normalize_value(&self.value)
    }

    /// Storage discriminator: the normalized value for multi-valued facts,
    /// empty for singletons (so a replaced singleton overwrites its row).
    pub fn value_key(&self) -> String {
        match self.cardinality {
            Cardinality::Singleton => String::new(),
            Cardinality::MultiValued => self.normalized_value(),
        }
    }
}

/// One subject's stored facts keyed by normalized attribute key.
pub type FactMap = BTreeMap<String, Vec<UserFact>>;

/// Lifecycle state of the run that last wrote a checkpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Running, or stopped by a signal with messages left.
    #[default]
    InProgress,
    /// Every message of the transcript was committed.
    Completed,
    /// Stopped by an unrecoverable storage error.
    Failed,
}

/// Durable progress marker for one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingCheckpoint {
    pub schema_version: u32,
    pub chat_id: i64,
    /// Every message with an id at or below this one has been committed.
    pub last_processed_message_id: i64,
    /// Messages committed (reconciled or passed through), across all runs.
    pub processed_count: u64,
    /// Messages that were skipped; always equals `skip_reasons.len()`.
    pub skipped_count: u64,
    pub skip_reasons: BTreeMap<i64, String>,
    /// RFC 3339 time of the last save.
    pub updated_at: Option<String>,
    #[serde(default)]
    pub run_status: RunStatus,
    /// RFC 3339 start of the run that last wrote this checkpoint.
    #[serde(default)]
    pub started_at: Option<String>,
    /// RFC 3339 end of that run; unset while it is in progress.
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl ProcessingCheckpoint {
    /// A checkpoint positioned before the first message of `chat_id`.
    pub fn new(chat_id: i64) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            chat_id,
            last_processed_message_id: 0,
            processed_count: 0,
            skipped_count: 0,
            skip_reasons: BTreeMap::new(),
            updated_at: None,
            run_status: RunStatus::InProgress,
            started_at: None,
            finished_at: None,
        }
    }

    /// Marks the start of a run over the remaining messages.
    pub fn begin_run(&mut self) {
        self.run_status = RunStatus::InProgress;
        self.started_at = Some(Utc::now().to_rfc3339());
        self.finished_at = None;
    }

    /// Records how the current run ended. An interrupted run stays
    /// [`RunStatus::InProgress`] and gets no end time.
    pub fn end_run(&mut self, status: RunStatus) {
        self.run_status = status;
        self.finished_at = match status {
            RunStatus::InProgress => None,
            RunStatus::Completed | RunStatus::Failed => Some(Utc::now().to_rfc3339()),
        };
    }

    /// Marks `message_id` as committed.
    pub fn advance(&mut self, message_id: i64) {
        if message_id > self.last_processed_message_id {
            self.last_processed_message_id = message_id;
        }
        self.processed_count += 1;
    }

    /// Marks `message_id` as skipped and committed past.
    pub fn skip(&mut self, message_id: i64, reason: impl Into<String>) {
        if self.skip_reasons.insert(message_id, reason.into()).is_none() {
            self.skipped_count += 1;
            self.processed_count += 1;
        }
        if message_id > self.last_processed_message_id {
            self.last_processed_message_id = message_id;
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Source,
    Extractor,
    FactStore,
    CheckpointMedium,
}

/// Normalizes an attribute key: case-folded, trimmed, with every run of
/// whitespace or punctuation collapsed to a single `_`.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;
    for ch in key.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Normalizes a value for comparison: trimmed, case-folded, whitespace collapsed.
pub fn normalize_value(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Trims and collapses internal whitespace runs to single spaces.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
