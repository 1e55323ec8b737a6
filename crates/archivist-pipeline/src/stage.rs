// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message processing stages.

use serde::Serialize;
use strum::{Display, EnumString};

/// Where a message is in `Pending → WindowBuilt → Extracted → Reconciled → Checkpointed`.
///
/// A message may leave for `Skipped` from `WindowBuilt` (extraction failed)
/// or `Extracted` (candidates rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStage {
    Pending,
    WindowBuilt,
    Extracted,
    Reconciled,
    Checkpointed,
    Skipped,
}

/// A message the pipeline gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipRecord {
    pub message_id: i64,
    /// The last stage the message reached before it was skipped.
    pub stage: MessageStage,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(message_id: i64, stage: MessageStage, reason: impl Into<String>) -> Self {
        Self {
            message_id,
            stage,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_render_snake_case() {
        assert_eq!(MessageStage::WindowBuilt.to_string(), "window_built");
        let json = serde_json::to_string(&SkipRecord::new(3, MessageStage::Extracted, "bad"))
            .unwrap();
        assert_eq!(json, r#"{"message_id":3,"stage":"extracted","reason":"bad"}"#);
    }
}
