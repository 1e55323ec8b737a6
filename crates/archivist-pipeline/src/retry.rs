// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timeout and exponential-backoff retry for collaborator calls.

use std::future::Future;
use std::time::Duration;

use archivist_config::model::PipelineConfig;
use archivist_core::ArchivistError;
use tracing::warn;

/// Attempt limit, backoff schedule, and per-attempt timeout for one kind of call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
}

/// The last error of a call that did not succeed, with the attempts spent.
#[derive(Debug)]
pub struct RetryError {
    pub attempts: u32,
    pub error: ArchivistError,
}

impl RetryError {
    /// True when every attempt failed transiently; false for a permanent failure.
    pub fn exhausted(&self) -> bool {
        self.error.is_transient()
    }
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exhausted() {
            write!(f, "gave up after {} attempts: {}", self.attempts, self.error)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            timeout,
        }
    }

    /// Policy for extractor calls.
    pub fn for_extraction(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.max_backoff(),
            config.extraction_timeout(),
        )
    }

    /// Policy for fact store calls.
    pub fn for_storage(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.max_backoff(),
            config.storage_timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay after the `failed`-th failed attempt: `initial × 2^(failed−1)`,
    /// capped at the maximum backoff.
    pub fn backoff(&self, failed: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failed.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// Each attempt is bounded by the policy timeout; an elapsed timeout is a
    /// transient [`ArchivistError::Timeout`].
    pub async fn run<T, F, Fut>(&self, what: &str, message_id: i64, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ArchivistError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ArchivistError::Timeout {
                    duration: self.timeout,
                },
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(RetryError {
                    attempts: attempt,
                    error,
                });
            }

            let delay = self.backoff(attempt);
            warn!(
                message_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "{what} failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
