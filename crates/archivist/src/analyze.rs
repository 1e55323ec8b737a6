// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `archivist analyze` command implementation.
//!
//! Wires the Telegram export, the Ollama extractor, the SQLite fact store,
//! and the chat's checkpoint file into a pipeline run. SIGINT/SIGTERM stop
//! the run after the last committed message.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use archivist_config::ArchivistConfig;
use archivist_core::{ArchivistError, HealthStatus, PluginAdapter};
use archivist_ollama::OllamaExtractor;
use archivist_pipeline::{PipelineOrchestrator, PipelineRunSummary, install_signal_handler};
use archivist_storage::SqliteFactStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the `archivist analyze` command and return its summary.
///
/// Resumes from the saved checkpoint unless `fresh` is set.
pub async fn run_analyze(
    config: &ArchivistConfig,
    path: &Path,
    fresh: bool,
) -> Result<PipelineRunSummary, ArchivistError> {
    analyze_until(config, path, fresh, install_signal_handler()).await
}

/// Like [`run_analyze`], stopping when `cancel` fires instead of on signals.
async fn analyze_until(
    config: &ArchivistConfig,
    path: &Path,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<PipelineRunSummary, ArchivistError> {
    let transcript = crate::load_transcript(path).await?;

    let extractor = Arc::new(OllamaExtractor::new(&config.ollama)?);
    match extractor.health_check().await {
        Ok(HealthStatus::Healthy) => {}
        Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
            warn!(reason = %reason, "extractor is not healthy, extraction calls may fail");
        }
        Err(e) => warn!(error = %e, "extractor health check failed"),
    }

    let store = Arc::new(SqliteFactStore::open(&config.storage).await?);
    let checkpoints = crate::checkpoint_store(config, transcript.chat_id);
    let orchestrator = PipelineOrchestrator::new(config, extractor, store.clone(), checkpoints);

    info!(
        chat_id = transcript.chat_id,
        model = %config.ollama.model,
        fresh,
        "starting analysis"
    );
    let result = orchestrator.run(&transcript, !fresh, cancel).await;

    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "fact store shutdown failed");
    }
    result
}

/// Renders a run summary for the terminal.
pub fn format_summary(summary: &PipelineRunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "  archivist analyze");
    let _ = writeln!(out, "  {}", "-".repeat(35));
    let _ = writeln!(out, "    Chat:        {}", summary.chat_id);
    let state = if summary.interrupted {
        "interrupted"
    } else {
        "complete"
    };
    let _ = writeln!(out, "    Run:         {state}");
    let _ = writeln!(
        out,
        "    Progress:    message {} -> {}",
        summary.started_after, summary.last_committed_message_id
    );
    let _ = writeln!(
        out,
        "    Processed:   {} ({} skipped)",
        summary.processed_count, summary.skipped_count
    );
    let _ = writeln!(out, "    Facts:       {} written", summary.facts_written);

    if !summary.discovered_keys.is_empty() {
        let keys: Vec<&str> = summary.discovered_keys.iter().map(String::as_str).collect();
        let _ = writeln!(out, "    New keys:    {}", keys.join(", "));
    }

    if !summary.conflicts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Conflicts");
        for c in &summary.conflicts {
            let _ = writeln!(
                out,
                "    {}.{}: {:?} ({:.2}, #{}) vs {:?} ({:.2}, #{}) -> {}",
                c.subject_user_id,
                c.attribute_key,
                c.existing_value,
                c.existing_confidence,
                c.existing_message_id,
                c.candidate_value,
                c.candidate_confidence,
                c.candidate_message_id,
                c.resolution
            );
        }
    }

    if !summary.skip_reasons.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Skipped");
        for skip in &summary.skip_reasons {
            let _ = writeln!(
                out,
                "    #{} at {}: {}",
                skip.message_id, skip.stage, skip.reason
            );
        }
    }

    if summary.interrupted {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Run `archivist analyze` again to resume.");
    }
    out
}

#[cfg(test)]
mod tests {
    use archivist_pipeline::{MessageStage, SkipRecord};

    use super::*;
    use crate::test_support::{EXPORT_CHAT_ID, config_in, write_export};

    #[tokio::test]
    async fn unreachable_model_skips_messages_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let export = write_export(dir.path());

        let summary = analyze_until(&config, &export, false, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.chat_id, EXPORT_CHAT_ID);
        assert!(!summary.interrupted);
        assert_eq!(summary.processed_count, 3);
        assert_eq!(summary.skipped_count, 2);
        assert_eq!(summary.last_committed_message_id, 3);
        assert!(
            summary
                .skip_reasons
                .iter()
                .all(|s| s.reason.starts_with("extraction failed"))
        );
        let checkpoint_file = std::path::Path::new(&config.storage.state_dir)
            .join(format!("chat-{EXPORT_CHAT_ID}.checkpoint.json"));
        assert!(checkpoint_file.exists());

        let resumed = analyze_until(&config, &export, false, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resumed.started_after, 3);
        assert_eq!(resumed.processed_count, 0);

        let fresh = analyze_until(&config, &export, true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fresh.started_after, 0);
        assert_eq!(fresh.processed_count, 3);
    }

    #[tokio::test]
    async fn cancelled_run_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let export = write_export(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = analyze_until(&config, &export, false, cancel).await.unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.processed_count, 0);
        assert_eq!(summary.last_committed_message_id, 0);
        assert!(format_summary(&summary).contains("again to resume"));
    }

    #[tokio::test]
    async fn missing_export_fails_before_touching_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let err = analyze_until(
            &config,
            &dir.path().join("nope.json"),
            false,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ArchivistError::Parse { .. }));
        assert!(!dir.path().join("facts.db").exists());
    }

    #[test]
    fn summary_lists_keys_and_skips() {
        let summary = PipelineRunSummary {
            chat_id: 9,
            started_after: 10,
            last_committed_message_id: 40,
            processed_count: 30,
            skipped_count: 1,
            skip_reasons: vec![SkipRecord::new(
                17,
                MessageStage::Extracted,
                "confidence 1.4 is outside [0, 1]",
            )],
            discovered_keys: ["pets".to_string(), "goals".to_string()].into(),
            facts_written: 12,
            ..Default::default()
        };

        let text = format_summary(&summary);
        assert!(text.contains("message 10 -> 40"));
        assert!(text.contains("30 (1 skipped)"));
        assert!(text.contains("New keys:    goals, pets"));
        assert!(text.contains("#17 at extracted: confidence 1.4"));
        assert!(text.contains("complete"));
        assert!(!text.contains("Conflicts"));
    }
}
