// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory checkpoint medium.

use async_trait::async_trait;
use tokio::sync::Mutex;

use archivist_core::traits::{CheckpointMedium, PluginAdapter};
use archivist_core::types::{AdapterType, HealthStatus};
use archivist_core::ArchivistError;

/// A [`CheckpointMedium`] holding its record in memory.
///
/// Replacement is trivially atomic. Writes can be made to fail to exercise
/// save-failure paths.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    record: Mutex<Option<Vec<u8>>>,
    fail_writes: Mutex<bool>,
    replace_count: Mutex<u32>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium pre-loaded with `bytes`.
    pub fn with_record(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            record: Mutex::new(Some(bytes.into())),
            ..Self::default()
        }
    }

    /// Makes subsequent `replace` calls fail (or succeed again).
    pub async fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().await = fail;
    }

    /// Successful `replace` calls so far.
    pub async fn replace_count(&self) -> u32 {
        *self.replace_count.lock().await
    }

    /// The current record.
    pub async fn contents(&self) -> Option<Vec<u8>> {
        self.record.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MemoryMedium {
    fn name(&self) -> &str {
        "memory-medium"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CheckpointMedium
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl CheckpointMedium for MemoryMedium {
    async fn read(&self) -> Result<Option<Vec<u8>>, ArchivistError> {
        Ok(self.record.lock().await.clone())
    }

    async fn replace(&self, bytes: &[u8]) -> Result<(), ArchivistError> {
        if *self.fail_writes.lock().await {
            return Err(ArchivistError::storage("injected checkpoint write failure"));
        }
        *self.record.lock().await = Some(bytes.to_vec());
        *self.replace_count.lock().await += 1;
        Ok(())
    }

    async fn remove(&self) -> Result<(), ArchivistError> {
        *self.record.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_read_remove() {
        let medium = MemoryMedium::new();
        assert!(medium.read().await.unwrap().is_none());

        medium.replace(b"one").await.unwrap();
        medium.replace(b"two").await.unwrap();
        assert_eq!(medium.read().await.unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(medium.replace_count().await, 2);

        medium.remove().await.unwrap();
        medium.remove().await.unwrap();
        assert!(medium.contents().await.is_none());
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_record() {
        let medium = MemoryMedium::with_record("old");
        medium.set_fail_writes(true).await;
        assert!(medium.replace(b"new").await.is_err());
        assert_eq!(medium.contents().await.as_deref(), Some(&b"old"[..]));
    }
}
