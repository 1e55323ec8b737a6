// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fact extractor trait for language-model backends.

use async_trait::async_trait;

use crate::error::ArchivistError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CandidateFact, ContextWindow};

/// Proposes candidate facts from a context window.
///
/// Implementations must report retryable failures as
/// [`ArchivistError::TransientExtraction`] (or [`ArchivistError::Timeout`])
/// and everything else as [`ArchivistError::PermanentExtraction`].
#[async_trait]
pub trait FactExtractor: PluginAdapter {
    async fn extract(&self, window: &ContextWindow) -> Result<Vec<CandidateFact>, ArchivistError>;
}
