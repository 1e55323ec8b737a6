// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The main processing loop.
//!
//! Messages after the checkpoint are turned into extraction futures that run
//! up to `concurrency` ahead of the commit cursor. `buffered` yields their
//! results in message order, so each message is committed (reconciled,
//! written, and counted into the checkpoint) strictly after its predecessor.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use archivist_config::ArchivistConfig;
use archivist_config::model::PipelineConfig;
use archivist_context::{ContextWindowBuilder, WindowSpec};
use archivist_core::types::{CandidateFact, Message, ProcessingCheckpoint, RunStatus, Transcript};
use archivist_core::{ArchivistError, FactExtractor, FactStore};
use archivist_memory::{FactReconciler, ReconcilePolicy, Reconciliation, new_keys};
use archivist_storage::CheckpointStore;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::locks::SubjectLocks;
use crate::retry::{RetryError, RetryPolicy};
use crate::stage::{MessageStage, SkipRecord};
use crate::summary::PipelineRunSummary;

/// Result of the extraction half of a message.
enum Extraction {
    /// Nothing to extract (service message); the cursor just moves on.
    PassThrough,
    Candidates(Vec<CandidateFact>),
    Skip(SkipRecord),
}

/// Drives a transcript through extraction, reconciliation, and storage.
pub struct PipelineOrchestrator {
    extractor: Arc<dyn FactExtractor>,
    store: Arc<dyn FactStore>,
    checkpoints: CheckpointStore,
    reconciler: FactReconciler,
    window: WindowSpec,
    config: PipelineConfig,
    extraction_retry: RetryPolicy,
    storage_retry: RetryPolicy,
    locks: SubjectLocks,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator using the `[context]`, `[pipeline]`, and
    /// `[reconcile]` sections of `config`.
    pub fn new(
        config: &ArchivistConfig,
        extractor: Arc<dyn FactExtractor>,
        store: Arc<dyn FactStore>,
        checkpoints: CheckpointStore,
    ) -> Self {
        Self {
            extractor,
            store,
            checkpoints,
            reconciler: FactReconciler::new(ReconcilePolicy::from_config(&config.reconcile)),
            window: WindowSpec::from(&config.context),
            config: config.pipeline.clone(),
            extraction_retry: RetryPolicy::for_extraction(&config.pipeline),
            storage_retry: RetryPolicy::for_storage(&config.pipeline),
            locks: SubjectLocks::new(),
        }
    }

    /// Shares `locks` with other orchestrators writing to the same store.
    pub fn with_locks(mut self, locks: SubjectLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn locks(&self) -> &SubjectLocks {
        &self.locks
    }

    /// Clears the saved checkpoint. Stored facts are kept.
    pub async fn reset(&self) -> Result<(), ArchivistError> {
        self.checkpoints.reset().await
    }

    /// Processes `transcript`, resuming after the saved checkpoint when
    /// `resume` is set.
    ///
    /// Extraction failures skip the message and the run continues. A write
    /// that still fails after every retry saves progress and returns
    /// [`ArchivistError::StorageWrite`]. Cancelling `cancel` finishes the
    /// message being committed, saves, and returns with `interrupted` set.
    ///
    /// The checkpoint records the run's status and start and end times. A
    /// run with nothing left to do leaves it untouched.
    pub async fn run(
        &self,
        transcript: &Transcript,
        resume: bool,
        cancel: CancellationToken,
    ) -> Result<PipelineRunSummary, ArchivistError> {
        let chat_id = transcript.chat_id;
        let mut checkpoint = if resume {
            self.checkpoints
                .load_validated(chat_id, transcript.max_message_id())
                .await?
                .unwrap_or_else(|| ProcessingCheckpoint::new(chat_id))
        } else {
            ProcessingCheckpoint::new(chat_id)
        };
        let started_after = checkpoint.last_processed_message_id;
        // Status as last written; a fresh checkpoint has none on disk.
        let mut persisted = resume.then_some(checkpoint.run_status);
        let mut summary = PipelineRunSummary::new(chat_id, started_after);

        let builder = ContextWindowBuilder::new(transcript.messages.iter().cloned());
        let pending: Vec<&Message> = builder
            .messages()
            .iter()
            .filter(|m| m.id > started_after)
            .collect();

        info!(
            chat_id,
            started_after,
            pending = pending.len(),
            resume,
            "pipeline run starting"
        );
        if !pending.is_empty() {
            checkpoint.begin_run();
        }

        let store = &self.store;
        let mut known_keys = self
            .storage_retry
            .run("listing attribute keys", started_after, move || {
                store.known_attribute_keys()
            })
            .await
            .map_err(storage_write_error)?;

        let concurrency = self.config.concurrency.max(1);
        let interval = self.config.checkpoint_interval.max(1);
        let builder = &builder;
        let mut extractions = std::pin::pin!(
            futures::stream::iter(pending.iter().map(move |&message| async move {
                (message.id, self.extract(builder, message).await)
            }))
            .buffered(concurrency)
        );

        let mut unsaved = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                next = extractions.next() => next,
            };
            let Some((message_id, extraction)) = next else {
                break;
            };

            match extraction {
                Extraction::PassThrough => {
                    debug!(message_id, "service message, nothing to extract");
                    checkpoint.advance(message_id);
                }
                Extraction::Skip(record) => {
                    warn!(
                        message_id,
                        stage = %record.stage,
                        reason = %record.reason,
                        "message skipped"
                    );
                    checkpoint.skip(message_id, record.reason.clone());
                    summary.skipped_count += 1;
                    summary.skip_reasons.push(record);
                }
                Extraction::Candidates(candidates) => {
                    if let Err(e) = self
                        .commit(message_id, candidates, &mut known_keys, &mut summary)
                        .await
                    {
                        error!(message_id, error = %e, "fact write failed, stopping");
                        checkpoint.end_run(RunStatus::Failed);
                        match self.checkpoints.save(&checkpoint).await {
                            Ok(()) => {
                                summary.last_committed_message_id =
                                    checkpoint.last_processed_message_id;
                            }
                            Err(save_err) => {
                                error!(error = %save_err, "failed to save progress before stopping");
                            }
                        }
                        return Err(e);
                    }
                    checkpoint.advance(message_id);
                }
            }
            summary.processed_count += 1;
            unsaved += 1;
            debug!(message_id, stage = %MessageStage::Checkpointed, "message committed");

            if unsaved >= interval {
                self.checkpoints.save(&checkpoint).await?;
                summary.last_committed_message_id = checkpoint.last_processed_message_id;
                persisted = Some(checkpoint.run_status);
                unsaved = 0;
            }
        }

        if summary.interrupted {
            checkpoint.end_run(RunStatus::InProgress);
        } else {
            checkpoint.end_run(RunStatus::Completed);
        }
        let completes = checkpoint.run_status == RunStatus::Completed
            && persisted != Some(RunStatus::Completed);
        if unsaved > 0 || completes {
            self.checkpoints.save(&checkpoint).await?;
            summary.last_committed_message_id = checkpoint.last_processed_message_id;
        }

        if summary.interrupted {
            info!(
                chat_id,
                last_committed = summary.last_committed_message_id,
                "pipeline run interrupted"
            );
        } else {
            info!(
                chat_id,
                processed = summary.processed_count,
                skipped = summary.skipped_count,
                facts_written = summary.facts_written,
                conflicts = summary.conflicts.len(),
                "pipeline run finished"
            );
        }
        Ok(summary)
    }

    /// Builds the window for `message` and extracts validated candidates.
    async fn extract(&self, builder: &ContextWindowBuilder, message: &Message) -> Extraction {
        let message_id = message.id;
        if message.is_service && !self.config.include_service_messages {
            return Extraction::PassThrough;
        }

        let Some(window) = builder.build(message_id, &self.window) else {
            return Extraction::Skip(SkipRecord::new(
                message_id,
                MessageStage::Pending,
                "message is not in the transcript",
            ));
        };
        debug!(
            message_id,
            stage = %MessageStage::WindowBuilt,
            window = window.messages.len(),
            "context window built"
        );

        let extractor = &self.extractor;
        let window = &window;
        let candidates = match self
            .extraction_retry
            .run("extraction", message_id, move || extractor.extract(window))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                return Extraction::Skip(SkipRecord::new(
                    message_id,
                    MessageStage::WindowBuilt,
                    format!("extraction failed: {e}"),
                ));
            }
        };

        if let Some(err) = candidates.iter().find_map(|c| c.validate().err()) {
            return Extraction::Skip(SkipRecord::new(
                message_id,
                MessageStage::Extracted,
                err.to_string(),
            ));
        }

        debug!(
            message_id,
            stage = %MessageStage::Extracted,
            candidates = candidates.len(),
            "candidates extracted"
        );
        Extraction::Candidates(candidates)
    }

    /// Reconciles and writes every subject's candidates for one message.
    ///
    /// Subjects are processed concurrently. All of them run to completion
    /// before the first error (if any) is returned.
    async fn commit(
        &self,
        message_id: i64,
        candidates: Vec<CandidateFact>,
        known_keys: &mut BTreeSet<String>,
        summary: &mut PipelineRunSummary,
    ) -> Result<(), ArchivistError> {
        let mut by_subject: BTreeMap<String, Vec<CandidateFact>> = BTreeMap::new();
        for candidate in candidates {
            by_subject
                .entry(candidate.subject_user_id.clone())
                .or_default()
                .push(candidate);
        }

        let results = futures::future::join_all(
            by_subject
                .iter()
                .map(|(subject, batch)| self.commit_subject(message_id, subject, batch)),
        )
        .await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(reconciliation) => {
                    summary.facts_written += reconciliation.writes.len() as u64;
                    let report = reconciliation.report;
                    let fresh = new_keys(&report.discovered_keys, known_keys);
                    for key in &fresh {
                        info!(message_id, key = %key, "new attribute type discovered");
                    }
                    known_keys.extend(fresh.iter().cloned());
                    summary.discovered_keys.extend(fresh);
                    summary.conflicts.extend(report.conflicts);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read-merge-write for one subject under its lock.
    async fn commit_subject(
        &self,
        message_id: i64,
        subject: &str,
        batch: &[CandidateFact],
    ) -> Result<Reconciliation, ArchivistError> {
        let _guard = self.locks.lock(subject).await;
        let store = &self.store;

        let existing = self
            .storage_retry
            .run("reading facts", message_id, move || store.get_user_facts(subject))
            .await
            .map_err(storage_write_error)?;

        let reconciliation = self.reconciler.reconcile(subject, batch, &existing);
        debug!(
            message_id,
            subject,
            stage = %MessageStage::Reconciled,
            writes = reconciliation.writes.len(),
            conflicts = reconciliation.report.conflicts.len(),
            "candidates reconciled"
        );

        if !reconciliation.is_noop() {
            let writes = reconciliation.writes.as_slice();
            self.storage_retry
                .run("writing facts", message_id, move || {
                    store.upsert_user_facts(subject, writes)
                })
                .await
                .map_err(storage_write_error)?;
        }
        Ok(reconciliation)
    }
}

fn storage_write_error(e: RetryError) -> ArchivistError {
    ArchivistError::StorageWrite {
        attempts: e.attempts,
        source: Box::new(e.error),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use archivist_core::CheckpointMedium;
    use archivist_test_utils::builders::{anonymous, chat, service_message, text_message, transcript};
    use archivist_test_utils::{MemoryFactStore, MemoryMedium, MockExtractor, Outcome};
    use tracing_test::traced_test;

    use super::*;

    struct Harness {
        extractor: Arc<MockExtractor>,
        store: Arc<MemoryFactStore>,
        medium: Arc<MemoryMedium>,
        orchestrator: PipelineOrchestrator,
    }

    fn config() -> ArchivistConfig {
        let mut config = ArchivistConfig::default();
        config.pipeline.initial_backoff_ms = 10;
        config.pipeline.max_backoff_ms = 100;
        config.pipeline.max_attempts = 3;
        config.pipeline.checkpoint_interval = 2;
        config
    }

    fn harness_with(config: ArchivistConfig, extractor: MockExtractor) -> Harness {
        let extractor = Arc::new(extractor);
        let store = Arc::new(MemoryFactStore::new());
        let medium = Arc::new(MemoryMedium::new());
        let orchestrator = PipelineOrchestrator::new(
            &config,
            extractor.clone(),
            store.clone(),
            CheckpointStore::new(medium.clone()),
        );
        Harness {
            extractor,
            store,
            medium,
            orchestrator,
        }
    }

    fn harness(extractor: MockExtractor) -> Harness {
        harness_with(config(), extractor)
    }

    #[tokio::test(start_paused = true)]
    async fn processes_every_message_and_saves_at_the_end() {
        let h = harness(MockExtractor::new());
        let input = transcript(vec![
            text_message(1, "alice", "city: Paris"),
            text_message(2, "bob", "hello there"),
            text_message(3, "alice", "interests: chess"),
        ]);

        let summary = h
            .orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.processed_count, 3);
        assert_eq!(summary.skipped_count, 0);
        assert_eq!(summary.facts_written, 2);
        assert_eq!(summary.last_committed_message_id, 3);
        assert!(!summary.interrupted);
        // Saved once at the interval (after 2) and once at the end.
        assert_eq!(h.medium.replace_count().await, 2);

        let saved = h.orchestrator.checkpoints().load().await.unwrap().unwrap();
        assert_eq!(saved.last_processed_message_id, 3);
        assert_eq!(saved.processed_count, 3);
        assert_eq!(saved.run_status, RunStatus::Completed);
        assert!(saved.started_at.is_some());
        assert!(saved.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_saved_after_a_final_interval_save() {
        let h = harness(MockExtractor::new());
        // Two messages with interval 2: the interval save covers everything.
        let summary = h
            .orchestrator
            .run(&transcript(chat(2)), true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.last_committed_message_id, 2);
        assert_eq!(h.medium.replace_count().await, 2);

        let saved = h.orchestrator.checkpoints().load().await.unwrap().unwrap();
        assert_eq!(saved.run_status, RunStatus::Completed);
        assert_eq!(saved.last_processed_message_id, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_skipped() {
        let extractor = MockExtractor::new()
            .script(1, vec![Outcome::Transient("busy".into()), Outcome::FromText])
            .script(2, vec![Outcome::Transient("down".into())]);
        let h = harness(extractor);
        let input = transcript(vec![
            text_message(1, "alice", "city: Paris"),
            text_message(2, "bob", "city: Rome"),
        ]);

        let summary = h
            .orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.extractor.calls_for(1).await, 2);
        assert_eq!(h.extractor.calls_for(2).await, 3);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.skip_reasons[0].message_id, 2);
        assert_eq!(summary.skip_reasons[0].stage, MessageStage::WindowBuilt);
        assert!(summary.skip_reasons[0].reason.contains("gave up after 3 attempts"));

        let saved = h.orchestrator.checkpoints().load().await.unwrap().unwrap();
        assert_eq!(saved.last_processed_message_id, 2);
        assert_eq!(saved.skipped_count, 1);
        assert!(saved.skip_reasons.contains_key(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_candidates_skip_from_extracted() {
        let extractor = MockExtractor::new().script(
            1,
            vec![Outcome::Facts(vec![archivist_test_utils::builders::candidate(
                "alice", "city", "Paris", 1.7, &[1],
            )])],
        );
        let h = harness(extractor);
        let summary = h
            .orchestrator
            .run(&transcript(vec![text_message(1, "alice", "x")]), true, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.skip_reasons[0].stage, MessageStage::Extracted);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_timeout_skips_the_message() {
        let mut cfg = config();
        cfg.pipeline.extraction_timeout_secs = 1;
        cfg.pipeline.max_attempts = 2;
        let h = harness_with(cfg, MockExtractor::new().script(1, vec![Outcome::Hang]));

        let summary = h
            .orchestrator
            .run(&transcript(vec![text_message(1, "alice", "x")]), true, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.skipped_count, 1);
        assert!(summary.skip_reasons[0].reason.contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn service_messages_pass_through_unless_enabled() {
        let input = transcript(vec![
            service_message(1, "alice", "invite members: bob"),
            text_message(2, "bob", "city: Oslo"),
        ]);

        let h = harness(MockExtractor::new());
        let summary = h
            .orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed_count, 2);
        assert_eq!(h.extractor.extracted_ids().await, vec![2]);

        let mut cfg = config();
        cfg.pipeline.include_service_messages = true;
        let h = harness_with(cfg, MockExtractor::new());
        h.orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.extractor.extracted_ids().await, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_targets_commit_without_facts() {
        let h = harness(MockExtractor::new());
        let summary = h
            .orchestrator
            .run(
                &transcript(vec![anonymous(1, "city: Lima")]),
                true,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.facts_written, 0);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_pending_means_no_save() {
        let h = harness(MockExtractor::new());
        let input = transcript(chat(3));
        h.orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();
        let before = h.medium.contents().await;
        let saves = h.medium.replace_count().await;

        let summary = h
            .orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.started_after, 3);
        assert_eq!(summary.processed_count, 0);
        assert_eq!(summary.last_committed_message_id, 3);
        assert_eq!(h.medium.replace_count().await, saves);
        assert_eq!(h.medium.contents().await, before);
        assert_eq!(h.extractor.total_calls().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_storage_error_saves_progress_first() {
        let mut cfg = config();
        cfg.pipeline.checkpoint_interval = 100;
        let h = harness_with(cfg, MockExtractor::new());
        h.store.fail_subject("carol").await;
        let input = transcript(vec![
            text_message(1, "alice", "city: Paris"),
            text_message(2, "bob", "hello"),
            text_message(3, "carol", "interests: go"),
            text_message(4, "alice", "pets: a cat"),
        ]);

        let err = h
            .orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ArchivistError::StorageWrite { attempts: 3, .. }),
            "got: {err}"
        );
        let saved = h.orchestrator.checkpoints().load().await.unwrap().unwrap();
        assert_eq!(saved.last_processed_message_id, 2);
        assert_eq!(saved.run_status, RunStatus::Failed);
        assert!(saved.finished_at.is_some());
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_finishes_current_message_and_saves() {
        let token = CancellationToken::new();
        let mut cfg = config();
        cfg.pipeline.concurrency = 1;
        cfg.pipeline.checkpoint_interval = 100;
        let h = harness_with(cfg, MockExtractor::new().cancel_on(3, token.clone()));

        let summary = h
            .orchestrator
            .run(&transcript(chat(6)), true, token)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert!(summary.last_committed_message_id >= 2);
        assert!(summary.last_committed_message_id < 6);
        let saved = h.orchestrator.checkpoints().load().await.unwrap().unwrap();
        assert_eq!(saved.last_processed_message_id, summary.last_committed_message_id);
        assert_eq!(saved.run_status, RunStatus::InProgress);
        assert!(saved.started_at.is_some());
        assert!(saved.finished_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn commits_stay_in_order_with_slow_extractions() {
        let mut cfg = config();
        cfg.pipeline.concurrency = 3;
        let extractor = MockExtractor::new()
            .delay(1, Duration::from_secs(5))
            .delay(2, Duration::from_secs(1));
        let h = harness_with(cfg, extractor);
        let input = transcript(vec![
            text_message(1, "alice", "city: Paris"),
            text_message(2, "alice", "city: Paris"),
            text_message(3, "alice", "city: Paris"),
        ]);

        h.orchestrator
            .run(&input, true, CancellationToken::new())
            .await
            .unwrap();

        let facts = h.store.get_user_facts("alice").await.unwrap();
        let city = &facts["city"][0];
        assert_eq!(city.first_seen_message_id, 1);
        assert_eq!(city.last_confirmed_message_id, 3);
        assert_eq!(city.confirmation_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn discovered_keys_exclude_known_ones() {
        let h = harness(MockExtractor::new());
        let input = transcript(vec![
            text_message(1, "alice", "zodiac: leo"),
            text_message(2, "bob", "zodiac: virgo; favorite color: red"),
        ]);
        let summary = h
            .orchestrator
            .run(&input, false, CancellationToken::new())
            .await
            .unwrap();
        let keys: Vec<_> = summary.discovered_keys.iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["favorite_color", "zodiac"]);

        let again = transcript(vec![text_message(3, "carol", "zodiac: aries")]);
        let summary = h
            .orchestrator
            .run(&again, false, CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.discovered_keys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_checkpoint_refuses_to_resume() {
        let h = harness(MockExtractor::new());
        h.medium.replace(b"{not json").await.unwrap();
        let err = h
            .orchestrator
            .run(&transcript(chat(2)), true, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchivistError::CorruptedState { .. }));

        h.orchestrator.reset().await.unwrap();
        let summary = h
            .orchestrator
            .run(&transcript(chat(2)), true, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed_count, 2);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn logs_skips_and_run_end() {
        let extractor =
            MockExtractor::new().script(1, vec![Outcome::Permanent("not json".into())]);
        let h = harness(extractor);
        h.orchestrator
            .run(&transcript(chat(1)), true, CancellationToken::new())
            .await
            .unwrap();
        assert!(logs_contain("message skipped"));
        assert!(logs_contain("pipeline run finished"));
    }
}
