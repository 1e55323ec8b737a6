// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message source trait for transcript parsers.

use async_trait::async_trait;

use crate::error::ArchivistError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Transcript;

/// Produces the ordered, finite message sequence of one chat.
#[async_trait]
pub trait MessageSource: PluginAdapter {
    /// Loads the whole transcript.
    async fn load(&self) -> Result<Transcript, ArchivistError>;
}
