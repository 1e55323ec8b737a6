// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumable fact-extraction pipeline.
//!
//! [`PipelineOrchestrator`] walks a transcript in message order, builds a
//! context window per message, asks the extractor for candidate facts,
//! reconciles them per subject, writes the results, and advances a durable
//! checkpoint. Extraction runs ahead of the commit cursor with bounded
//! concurrency; commits stay in id order.

pub mod locks;
pub mod orchestrator;
pub mod retry;
pub mod shutdown;
pub mod stage;
pub mod summary;

pub use locks::SubjectLocks;
pub use orchestrator::PipelineOrchestrator;
pub use retry::{RetryError, RetryPolicy};
pub use shutdown::install_signal_handler;
pub use stage::{MessageStage, SkipRecord};
pub use summary::PipelineRunSummary;
