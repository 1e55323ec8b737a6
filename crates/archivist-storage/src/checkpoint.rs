// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing checkpoint persistence and validation.

use std::sync::Arc;

use archivist_core::types::{CHECKPOINT_SCHEMA_VERSION, ProcessingCheckpoint};
use archivist_core::{ArchivistError, CheckpointMedium};
use tracing::info;

/// Loads, saves, and validates the checkpoint of one chat.
pub struct CheckpointStore {
    medium: Arc<dyn CheckpointMedium>,
}

impl CheckpointStore {
    pub fn new(medium: Arc<dyn CheckpointMedium>) -> Self {
        Self { medium }
    }

    pub fn medium(&self) -> &Arc<dyn CheckpointMedium> {
        &self.medium
    }

    /// Returns the saved checkpoint, or `None` if nothing was saved.
    pub async fn load(&self) -> Result<Option<ProcessingCheckpoint>, ArchivistError> {
        let Some(bytes) = self.medium.read().await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ArchivistError::corrupted(format!("checkpoint is not decodable: {e}")))
    }

    /// Loads the checkpoint and checks it against the current input.
    pub async fn load_validated(
        &self,
        chat_id: i64,
        max_message_id: i64,
    ) -> Result<Option<ProcessingCheckpoint>, ArchivistError> {
        match self.load().await? {
            Some(checkpoint) => {
                Self::validate(&checkpoint, chat_id, max_message_id)?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    /// Durably replaces the saved checkpoint, stamping `updated_at`.
    pub async fn save(&self, checkpoint: &ProcessingCheckpoint) -> Result<(), ArchivistError> {
        let mut stamped = checkpoint.clone();
        stamped.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let bytes = serde_json::to_vec_pretty(&stamped).map_err(|e| ArchivistError::Storage {
            source: Box::new(e),
        })?;
        self.medium.replace(&bytes).await?;
        info!(
            chat_id = stamped.chat_id,
            last_processed = stamped.last_processed_message_id,
            processed = stamped.processed_count,
            skipped = stamped.skipped_count,
            "checkpoint saved"
        );
        Ok(())
    }

    /// Deletes the saved checkpoint. Resetting a missing checkpoint succeeds.
    pub async fn reset(&self) -> Result<(), ArchivistError> {
        self.medium.remove().await?;
        info!("checkpoint reset");
        Ok(())
    }

    /// Checks a loaded checkpoint for internal consistency and against the input.
    pub fn validate(
        checkpoint: &ProcessingCheckpoint,
        chat_id: i64,
        max_message_id: i64,
    ) -> Result<(), ArchivistError> {
        if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(ArchivistError::corrupted(format!(
                "checkpoint schema version {} is not supported (expected {CHECKPOINT_SCHEMA_VERSION})",
                checkpoint.schema_version
            )));
        }
        if checkpoint.chat_id != chat_id {
            return Err(ArchivistError::corrupted(format!(
                "checkpoint belongs to chat {}, not chat {chat_id}",
                checkpoint.chat_id
            )));
        }
        if checkpoint.last_processed_message_id > max_message_id {
            return Err(ArchivistError::corrupted(format!(
                "checkpoint is past the end of the transcript ({} > {max_message_id})",
                checkpoint.last_processed_message_id
            )));
        }
        if checkpoint.skipped_count != checkpoint.skip_reasons.len() as u64 {
            return Err(ArchivistError::corrupted(format!(
                "skipped_count {} does not match {} recorded skip reasons",
                checkpoint.skipped_count,
                checkpoint.skip_reasons.len()
            )));
        }
        if checkpoint.skipped_count > checkpoint.processed_count {
            return Err(ArchivistError::corrupted(format!(
                "skipped_count {} exceeds processed_count {}",
                checkpoint.skipped_count, checkpoint.processed_count
            )));
        }
        if let Some((&id, _)) = checkpoint.skip_reasons.iter().next_back() {
            if id > checkpoint.last_processed_message_id {
                return Err(ArchivistError::corrupted(format!(
                    "skipped message {id} is beyond last processed message {}",
                    checkpoint.last_processed_message_id
                )));
            }
        }
        if checkpoint.processed_count > 0 && checkpoint.last_processed_message_id == 0 {
            return Err(ArchivistError::corrupted(
                "checkpoint counts messages but has no last processed id",
            ));
        }
        Ok(())
    }
}
