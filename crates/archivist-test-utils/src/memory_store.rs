// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory fact store with failure injection.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use archivist_core::traits::{FactStore, PluginAdapter};
use archivist_core::types::{AdapterType, FactMap, HealthStatus, UserFact};
use archivist_core::ArchivistError;

/// Row key: (subject, attribute key, value key), as in the SQLite store.
type RowKey = (String, String, String);

#[derive(Debug, Default)]
struct Injection {
    /// Upserts that fail before the store starts succeeding again.
    failing_upserts: u32,
    /// Every upsert fails.
    always_fail: bool,
    /// Upserts for these subjects always fail.
    failing_subjects: BTreeSet<String>,
    /// Upserts sleep this long before doing anything.
    upsert_delay: Option<Duration>,
}

/// An in-memory [`FactStore`] keyed exactly like the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    rows: Mutex<BTreeMap<RowKey, UserFact>>,
    injection: Mutex<Injection>,
    upsert_calls: Mutex<u32>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` upserts fail with a storage error.
    pub async fn fail_next_upserts(&self, count: u32) {
        self.injection.lock().await.failing_upserts = count;
    }

    /// Makes every upsert fail until [`heal`](Self::heal) is called.
    pub async fn fail_all_upserts(&self) {
        self.injection.lock().await.always_fail = true;
    }

    /// Makes every upsert for `subject` fail until [`heal`](Self::heal) is called.
    pub async fn fail_subject(&self, subject: &str) {
        self.injection
            .lock()
            .await
            .failing_subjects
            .insert(subject.to_string());
    }

    /// Delays every upsert, for exercising storage timeouts.
    pub async fn delay_upserts(&self, delay: Duration) {
        self.injection.lock().await.upsert_delay = Some(delay);
    }

    /// Clears every injected failure and delay.
    pub async fn heal(&self) {
        *self.injection.lock().await = Injection::default();
    }

    /// Upsert calls made, including failed ones.
    pub async fn upsert_calls(&self) -> u32 {
        *self.upsert_calls.lock().await
    }

    /// Every stored fact, ordered by (subject, key, value key).
    pub async fn all_facts(&self) -> Vec<UserFact> {
        self.rows.lock().await.values().cloned().collect()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for MemoryFactStore {
    fn name(&self) -> &str {
        "memory-fact-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::FactStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn get_user_facts(&self, subject_user_id: &str) -> Result<FactMap, ArchivistError> {
        let rows = self.rows.lock().await;
        let mut facts: Vec<&UserFact> = rows
            .iter()
            .filter(|((subject, _, _), _)| subject == subject_user_id)
            .map(|(_, fact)| fact)
            .collect();
        facts.sort_by(|a, b| {
            a.attribute_key
                .cmp(&b.attribute_key)
                .then(a.first_seen_message_id.cmp(&b.first_seen_message_id))
                .then(a.value_key().cmp(&b.value_key()))
        });

        let mut map = FactMap::new();
        for fact in facts {
            map.entry(fact.attribute_key.clone())
                .or_default()
                .push(fact.clone());
        }
        Ok(map)
    }

    async fn upsert_user_facts(
        &self,
        subject_user_id: &str,
        writes: &[UserFact],
    ) -> Result<(), ArchivistError> {
        *self.upsert_calls.lock().await += 1;

        let delay = {
            let mut injection = self.injection.lock().await;
            if injection.always_fail || injection.failing_subjects.contains(subject_user_id) {
                return Err(ArchivistError::storage("injected storage failure"));
            }
            if injection.failing_upserts > 0 {
                injection.failing_upserts -= 1;
                return Err(ArchivistError::storage("injected storage failure"));
            }
            injection.upsert_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(foreign) = writes.iter().find(|f| f.subject_user_id != subject_user_id) {
            return Err(ArchivistError::Internal(format!(
                "write for {} in a batch for {subject_user_id}",
                foreign.subject_user_id
            )));
        }

        let mut rows = self.rows.lock().await;
        for fact in writes {
            let key = (
                fact.subject_user_id.clone(),
                fact.attribute_key.clone(),
                fact.value_key(),
            );
            rows.insert(key, fact.clone());
        }
        Ok(())
    }

    async fn known_attribute_keys(&self) -> Result<BTreeSet<String>, ArchivistError> {
        Ok(self
            .rows
            .lock()
            .await
            .keys()
            .map(|(_, key, _)| key.clone())
            .collect())
    }
}
