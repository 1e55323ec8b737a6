// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `archivist reset-state` command implementation.

use std::path::Path;

use archivist_config::ArchivistConfig;
use archivist_core::ArchivistError;
use tracing::info;

/// Run the `archivist reset-state` command.
///
/// Deletes the checkpoint of the chat in the export at `path`. Stored facts
/// are kept. Resetting a chat without a checkpoint succeeds.
pub async fn run_reset_state(config: &ArchivistConfig, path: &Path) -> Result<(), ArchivistError> {
    let transcript = crate::load_transcript(path).await?;
    let checkpoints = crate::checkpoint_store(config, transcript.chat_id);

    let previous = checkpoints.load().await.ok().flatten();
    checkpoints.reset().await?;
    info!(chat_id = transcript.chat_id, "checkpoint reset");

    match previous {
        Some(checkpoint) => println!(
            "Checkpoint for chat {} cleared (was at message {}).",
            transcript.chat_id, checkpoint.last_processed_message_id
        ),
        None => println!("Chat {} had no checkpoint.", transcript.chat_id),
    }
    Ok(())
}
