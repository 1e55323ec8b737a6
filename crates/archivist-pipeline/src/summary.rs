// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run summary returned by the orchestrator.

use std::collections::BTreeSet;

use archivist_memory::ConflictRecord;
use serde::Serialize;

use crate::stage::SkipRecord;

/// What one `run` did. Counts cover this run only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineRunSummary {
    pub chat_id: i64,
    /// Checkpoint position the run started from (0 for a fresh run).
    pub started_after: i64,
    /// Position of the last checkpoint that was durably saved.
    pub last_committed_message_id: i64,
    /// Messages committed, skipped ones included.
    pub processed_count: u64,
    pub skipped_count: u64,
    pub skip_reasons: Vec<SkipRecord>,
    /// Attribute keys first seen in this run.
    pub discovered_keys: BTreeSet<String>,
    pub conflicts: Vec<ConflictRecord>,
    /// Fact rows inserted or updated.
    pub facts_written: u64,
    /// True when the run stopped on cancellation before the end of input.
    pub interrupted: bool,
}

impl PipelineRunSummary {
    pub(crate) fn new(chat_id: i64, started_after: i64) -> Self {
        Self {
            chat_id,
            started_after,
            last_committed_message_id: started_after,
            ..Self::default()
        }
    }
}
