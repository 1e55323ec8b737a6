// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed checkpoint medium with atomic replace.
//!
//! A save writes a sibling `.tmp` file, fsyncs it, renames it over the
//! record, then fsyncs the directory. A crash at any point leaves either the
//! old record or the new one on disk, never a torn write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use archivist_core::{AdapterType, ArchivistError, CheckpointMedium, HealthStatus, PluginAdapter};
use async_trait::async_trait;
use tracing::debug;

/// One checkpoint record stored as a file.
#[derive(Debug, Clone)]
pub struct FileMedium {
    path: PathBuf,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The medium for `chat_id` under `state_dir`: `chat-<id>.checkpoint.json`.
    pub fn for_chat(state_dir: impl AsRef<Path>, chat_id: i64) -> Self {
        Self::new(
            state_dir
                .as_ref()
                .join(format!("chat-{chat_id}.checkpoint.json")),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temporary file used during replace.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_err(e: io::Error) -> ArchivistError {
    ArchivistError::Storage {
        source: Box::new(e),
    }
}

fn write_atomically(path: &Path, temp: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    {
        let mut file = fs::File::create(temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(temp, path)?;

    // Persist the directory entry so the rename survives power loss.
    #[cfg(unix)]
    {
        let dir = dir.unwrap_or_else(|| Path::new("."));
        fs::File::open(dir)?.sync_all()?;
    }

    Ok(())
}

#[async_trait]
impl PluginAdapter for FileMedium {
    fn name(&self) -> &str {
        "file"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CheckpointMedium
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => Ok(HealthStatus::Degraded(
                format!("state directory {} does not exist yet", dir.display()),
            )),
            _ => Ok(HealthStatus::Healthy),
        }
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl CheckpointMedium for FileMedium {
    async fn read(&self) -> Result<Option<Vec<u8>>, ArchivistError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn replace(&self, bytes: &[u8]) -> Result<(), ArchivistError> {
        let path = self.path.clone();
        let temp = self.temp_path();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || write_atomically(&path, &temp, &bytes))
            .await
            .map_err(|e| ArchivistError::Internal(format!("checkpoint writer panicked: {e}")))?
            .map_err(io_err)?;
        debug!(path = %self.path.display(), "checkpoint file replaced");
        Ok(())
    }

    async fn remove(&self) -> Result<(), ArchivistError> {
        for path in [self.path.clone(), self.temp_path()] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "removed checkpoint file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn chat_file_naming() {
        let medium = FileMedium::for_chat("/var/lib/archivist", -100123);
        assert_eq!(
            medium.path(),
            Path::new("/var/lib/archivist/chat--100123.checkpoint.json")
        );
        assert_eq!(
            medium.temp_path(),
            Path::new("/var/lib/archivist/chat--100123.checkpoint.json.tmp")
        );
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::for_chat(dir.path(), 1);
        assert_eq!(medium.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn replace_creates_directories_and_overwrites() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::for_chat(dir.path().join("a/b"), 1);

        medium.replace(b"first").await.unwrap();
        medium.replace(b"second").await.unwrap();

        assert_eq!(medium.read().await.unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!medium.temp_path().exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::for_chat(dir.path(), 1);
        medium.remove().await.unwrap();
        medium.replace(b"x").await.unwrap();
        medium.remove().await.unwrap();
        medium.remove().await.unwrap();
        assert_eq!(medium.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn health_reports_missing_state_dir() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::for_chat(dir.path().join("missing"), 1);
        assert!(matches!(
            medium.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
        medium.replace(b"x").await.unwrap();
        assert_eq!(medium.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
