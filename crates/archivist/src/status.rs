// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `archivist status` command implementation.
//!
//! Reports how far the chat's checkpoint has progressed and whether the
//! extractor, fact store, and checkpoint medium are usable. Never writes.

use std::fmt::Write as _;
use std::path::Path;

use archivist_config::ArchivistConfig;
use archivist_core::{ArchivistError, HealthStatus, PluginAdapter, RunStatus};
use archivist_ollama::OllamaExtractor;
use archivist_storage::{CheckpointStore, SqliteFactStore};
use serde::Serialize;

/// Structured status output, also used for `--json`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub chat_id: i64,
    pub chat_name: String,
    pub total_messages: usize,
    pub checkpoint: CheckpointState,
    pub adapters: Vec<AdapterHealth>,
}

/// What is saved for the chat.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckpointState {
    /// Nothing saved; the next run starts from the first message.
    NotSaved,
    Valid {
        last_processed_message_id: i64,
        processed_count: u64,
        skipped_count: u64,
        /// Messages after the checkpoint.
        remaining: usize,
        run_status: RunStatus,
        started_at: Option<String>,
        finished_at: Option<String>,
        updated_at: Option<String>,
    },
    /// Unreadable or inconsistent with the export; needs `reset-state`.
    Corrupted { reason: String },
}

#[derive(Debug, Serialize)]
pub struct AdapterHealth {
    pub name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AdapterHealth {
    fn from_check(name: &str, check: Result<HealthStatus, ArchivistError>) -> Self {
        let (status, detail) = match check {
            Ok(HealthStatus::Healthy) => ("healthy", None),
            Ok(HealthStatus::Degraded(reason)) => ("degraded", Some(reason)),
            Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", Some(reason)),
            Err(e) => ("unhealthy", Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            status,
            detail,
        }
    }
}

/// Run the `archivist status` command.
///
/// If `json` is set, outputs structured JSON for scripting.
pub async fn run_status(
    config: &ArchivistConfig,
    path: &Path,
    json: bool,
) -> Result<(), ArchivistError> {
    let report = build_report(config, path).await?;
    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| ArchivistError::Internal(format!("failed to encode status: {e}")))?;
        println!("{text}");
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

/// Collects checkpoint progress and adapter health for the export at `path`.
pub async fn build_report(
    config: &ArchivistConfig,
    path: &Path,
) -> Result<StatusReport, ArchivistError> {
    let transcript = crate::load_transcript(path).await?;
    let chat_id = transcript.chat_id;
    let checkpoints = crate::checkpoint_store(config, chat_id);

    let checkpoint = match checkpoints.load().await {
        Ok(None) => CheckpointState::NotSaved,
        Ok(Some(cp)) => {
            match CheckpointStore::validate(&cp, chat_id, transcript.max_message_id()) {
                Ok(()) => CheckpointState::Valid {
                    remaining: transcript
                        .messages
                        .iter()
                        .filter(|m| m.id > cp.last_processed_message_id)
                        .count(),
                    last_processed_message_id: cp.last_processed_message_id,
                    processed_count: cp.processed_count,
                    skipped_count: cp.skipped_count,
                    run_status: cp.run_status,
                    started_at: cp.started_at,
                    finished_at: cp.finished_at,
                    updated_at: cp.updated_at,
                },
                Err(e) => CheckpointState::Corrupted {
                    reason: e.to_string(),
                },
            }
        }
        Err(e) => CheckpointState::Corrupted {
            reason: e.to_string(),
        },
    };

    let mut adapters = Vec::with_capacity(3);

    let extractor = match OllamaExtractor::new(&config.ollama) {
        Ok(extractor) => extractor.health_check().await,
        Err(e) => Err(e),
    };
    adapters.push(AdapterHealth::from_check(
        &format!("ollama ({})", config.ollama.model),
        extractor,
    ));

    // Opening the database would create it, so a missing file is reported
    // instead.
    let store = if Path::new(&config.storage.database_path).exists() {
        match SqliteFactStore::open(&config.storage).await {
            Ok(store) => store.health_check().await,
            Err(e) => Err(e),
        }
    } else {
        Ok(HealthStatus::Degraded(format!(
            "no fact database at {} yet",
            config.storage.database_path
        )))
    };
    adapters.push(AdapterHealth::from_check("sqlite", store));

    let medium = checkpoints.medium();
    adapters.push(AdapterHealth::from_check(
        medium.name(),
        medium.health_check().await,
    ));

    Ok(StatusReport {
        chat_id,
        chat_name: transcript.name,
        total_messages: transcript.messages.len(),
        checkpoint,
        adapters,
    })
}

/// Renders a status report for the terminal.
pub fn format_report(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "  archivist status");
    let _ = writeln!(out, "  {}", "-".repeat(35));
    let _ = writeln!(out, "    Chat:        {} ({})", report.chat_name, report.chat_id);
    let _ = writeln!(out, "    Messages:    {}", report.total_messages);

    match &report.checkpoint {
        CheckpointState::NotSaved => {
            let _ = writeln!(out, "    Checkpoint:  none (next run starts at the beginning)");
        }
        CheckpointState::Valid {
            last_processed_message_id,
            processed_count,
            skipped_count,
            remaining,
            run_status,
            started_at,
            finished_at,
            updated_at,
        } => {
            let _ = writeln!(
                out,
                "    Checkpoint:  message {last_processed_message_id}, {remaining} remaining"
            );
            let _ = writeln!(
                out,
                "    Processed:   {processed_count} ({skipped_count} skipped)"
            );
            let _ = writeln!(out, "    Last run:    {run_status}");
            if let Some(at) = started_at {
                let _ = writeln!(out, "    Started:     {at}");
            }
            if let Some(at) = finished_at {
                let _ = writeln!(out, "    Finished:    {at}");
            }
            if let Some(at) = updated_at {
                let _ = writeln!(out, "    Saved at:    {at}");
            }
        }
        CheckpointState::Corrupted { reason } => {
            let _ = writeln!(out, "    Checkpoint:  [ERR] {reason}");
            let _ = writeln!(out, "                 run `archivist reset-state` to start over");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  Adapters");
    for adapter in &report.adapters {
        let tag = match adapter.status {
            "healthy" => "[OK]",
            "degraded" => "[WARN]",
            _ => "[ERR]",
        };
        match &adapter.detail {
            Some(detail) => {
                let _ = writeln!(out, "    {tag} {}: {detail}", adapter.name);
            }
            None => {
                let _ = writeln!(out, "    {tag} {}", adapter.name);
            }
        }
    }
    let _ = writeln!(out);
    out
}
