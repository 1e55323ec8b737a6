// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-subject exclusion for the read-merge-write sequence.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A partitioned lock table keyed by subject user id.
///
/// Cloning shares the table, so orchestrators writing to the same store can
/// exclude each other per subject.
#[derive(Debug, Clone, Default)]
pub struct SubjectLocks {
    table: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `subject`. Released when the guard drops.
    pub async fn lock(&self, subject: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .table
            .entry(subject.to_string())
            .or_default()
            .value()
            .clone();
        mutex.lock_owned().await
    }

    /// Number of subjects seen so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
