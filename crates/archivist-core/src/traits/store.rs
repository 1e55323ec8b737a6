// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fact storage trait for profile persistence backends.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::ArchivistError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{FactMap, UserFact};

/// Durable per-user fact storage.
#[async_trait]
pub trait FactStore: PluginAdapter {
    /// Returns every stored fact of `subject_user_id`, keyed by normalized
    /// attribute key. Empty when the subject has no facts.
    async fn get_user_facts(&self, subject_user_id: &str) -> Result<FactMap, ArchivistError>;

    /// Inserts or replaces `writes` for `subject_user_id`.
    ///
    /// Must be idempotent: rows are keyed by (subject, attribute key) for
    /// singleton facts and (subject, attribute key, normalized value) for
    /// multi-valued facts, so applying the same writes twice is a no-op.
    async fn upsert_user_facts(
        &self,
        subject_user_id: &str,
        writes: &[UserFact],
    ) -> Result<(), ArchivistError>;

    /// Every attribute key stored for any subject.
    async fn known_attribute_keys(&self) -> Result<BTreeSet<String>, ArchivistError>;
}
