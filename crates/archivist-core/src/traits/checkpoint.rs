// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-level persistence medium for processing checkpoints.

use async_trait::async_trait;

use crate::error::ArchivistError;
use crate::traits::adapter::PluginAdapter;

/// A durable single-record byte store with atomic replace semantics.
///
/// A reader must never observe a partially written record: after a crash
/// during [`replace`](CheckpointMedium::replace), [`read`](CheckpointMedium::read)
/// returns either the old bytes or the new bytes.
#[async_trait]
pub trait CheckpointMedium: PluginAdapter {
    /// Returns the stored record, or `None` when nothing has been saved.
    async fn read(&self) -> Result<Option<Vec<u8>>, ArchivistError>;

    /// Atomically replaces the stored record and returns once it is durable.
    async fn replace(&self, bytes: &[u8]) -> Result<(), ArchivistError>;

    /// Removes the stored record. Removing a missing record succeeds.
    async fn remove(&self) -> Result<(), ArchivistError>;
}
