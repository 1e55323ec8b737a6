// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock fact extractor for deterministic testing.
//!
//! `MockExtractor` implements `FactExtractor` with per-message scripted
//! outcomes. Messages without a script fall back to reading facts straight
//! from the target text: `"city: Paris; interests: hiking @0.9"` yields two
//! candidates, the second with confidence 0.9.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use archivist_core::traits::{FactExtractor, PluginAdapter};
use archivist_core::types::{AdapterType, CandidateFact, ContextWindow, HealthStatus};
use archivist_core::ArchivistError;

/// Confidence of facts read from message text without an `@` suffix.
pub const TEXT_FACT_CONFIDENCE: f64 = 0.8;

/// One scripted response to an `extract` call.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Return these candidates.
    Facts(Vec<CandidateFact>),
    /// Fail with a retryable error.
    Transient(String),
    /// Fail with a non-retryable error.
    Permanent(String),
    /// Read facts from the target text (the unscripted behavior).
    FromText,
    /// Never complete. Exercises extraction timeouts.
    Hang,
}

/// A mock extractor with scripted per-message outcomes.
///
/// Scripts are queues: each call for a message pops the next outcome; once
/// the queue is empty the last popped outcome repeats. Unscripted messages
/// behave as [`Outcome::FromText`].
pub struct MockExtractor {
    scripts: Mutex<HashMap<i64, VecDeque<Outcome>>>,
    last: Mutex<HashMap<i64, Outcome>>,
    delays: HashMap<i64, Duration>,
    cancel_on: Option<(i64, CancellationToken)>,
    calls: Mutex<HashMap<i64, usize>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            last: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            cancel_on: None,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Scripts the outcomes of successive calls for `message_id`.
    pub fn script(mut self, message_id: i64, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .get_mut()
            .insert(message_id, VecDeque::from(outcomes));
        self
    }

    /// Delays every call for `message_id` by `delay`.
    pub fn delay(mut self, message_id: i64, delay: Duration) -> Self {
        self.delays.insert(message_id, delay);
        self
    }

    /// Cancels `token` when `message_id` is extracted, simulating a signal
    /// that arrives mid-run.
    pub fn cancel_on(mut self, message_id: i64, token: CancellationToken) -> Self {
        self.cancel_on = Some((message_id, token));
        self
    }

    /// Number of `extract` calls made for `message_id`.
    pub async fn calls_for(&self, message_id: i64) -> usize {
        self.calls.lock().await.get(&message_id).copied().unwrap_or(0)
    }

    /// Total number of `extract` calls.
    pub async fn total_calls(&self) -> usize {
        self.calls.lock().await.values().sum()
    }

    /// Ids of every message extracted at least once, ascending.
    pub async fn extracted_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.calls.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn next_outcome(&self, message_id: i64) -> Outcome {
        let popped = self
            .scripts
            .lock()
            .await
            .get_mut(&message_id)
            .and_then(VecDeque::pop_front);
        let mut last = self.last.lock().await;
        match popped {
            Some(outcome) => {
                last.insert(message_id, outcome.clone());
                outcome
            }
            None => last.get(&message_id).cloned().unwrap_or(Outcome::FromText),
        }
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads `key: value[ @confidence]` pairs separated by `;` from the target text.
pub fn facts_from_text(window: &ContextWindow) -> Vec<CandidateFact> {
    let Some(target) = window.target() else {
        return Vec::new();
    };
    let Some(subject) = target.sender_id.as_deref() else {
        return Vec::new();
    };

    target
        .text
        .split(';')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(key, rest)| {
            let (value, confidence) = match rest.rsplit_once(" @") {
                Some((value, conf)) => match conf.trim().parse::<f64>() {
                    Ok(conf) => (value, conf),
                    Err(_) => (rest, TEXT_FACT_CONFIDENCE),
                },
                None => (rest, TEXT_FACT_CONFIDENCE),
            };
            CandidateFact {
                subject_user_id: subject.to_string(),
                attribute_key: key.trim().to_string(),
                value: value.trim().to_string(),
                confidence,
                source_message_ids: [window.target_id].into_iter().collect(),
            }
        })
        .collect()
}

#[async_trait]
impl PluginAdapter for MockExtractor {
    fn name(&self) -> &str {
        "mock-extractor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl FactExtractor for MockExtractor {
    async fn extract(&self, window: &ContextWindow) -> Result<Vec<CandidateFact>, ArchivistError> {
        let id = window.target_id;
        *self.calls.lock().await.entry(id).or_insert(0) += 1;

        if let Some((cancel_id, token)) = &self.cancel_on {
            if *cancel_id == id {
                token.cancel();
            }
        }
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }

        match self.next_outcome(id).await {
            Outcome::Facts(facts) => Ok(facts),
            Outcome::Transient(message) => Err(ArchivistError::TransientExtraction {
                message,
                source: None,
            }),
            Outcome::Permanent(message) => Err(ArchivistError::PermanentExtraction { message }),
            Outcome::FromText => Ok(facts_from_text(window)),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{anonymous, candidate, text_message};

    fn window_for(message: archivist_core::Message) -> ContextWindow {
        ContextWindow {
            target_id: message.id,
            messages: vec![message],
        }
    }

    #[tokio::test]
    async fn reads_facts_from_text() {
        let extractor = MockExtractor::new();
        let window = window_for(text_message(7, "alice", "city: Paris; interests: hiking @0.9"));
        let facts = extractor.extract(&window).await.unwrap();

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0], candidate("alice", "city", "Paris", 0.8, &[7]));
        assert_eq!(facts[1], candidate("alice", "interests", "hiking", 0.9, &[7]));
        assert_eq!(extractor.calls_for(7).await, 1);
    }

    #[tokio::test]
    async fn plain_text_and_anonymous_yield_nothing() {
        let extractor = MockExtractor::new();
        let plain = window_for(text_message(1, "alice", "good morning"));
        let anon = window_for(anonymous(2, "city: Oslo"));
        assert!(extractor.extract(&plain).await.unwrap().is_empty());
        assert!(extractor.extract(&anon).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scripts_pop_in_order_then_repeat() {
        let extractor = MockExtractor::new().script(
            3,
            vec![
                Outcome::Transient("busy".into()),
                Outcome::Permanent("garbage".into()),
            ],
        );
        let window = window_for(text_message(3, "bob", "city: Rome"));

        assert!(extractor.extract(&window).await.unwrap_err().is_transient());
        assert!(!extractor.extract(&window).await.unwrap_err().is_transient());
        assert!(!extractor.extract(&window).await.unwrap_err().is_transient());
        assert_eq!(extractor.calls_for(3).await, 3);
        assert_eq!(extractor.total_calls().await, 3);
    }

    #[tokio::test]
    async fn cancel_on_fires_token() {
        let token = CancellationToken::new();
        let extractor = MockExtractor::new().cancel_on(2, token.clone());
        extractor
            .extract(&window_for(text_message(1, "alice", "hi")))
            .await
            .unwrap();
        assert!(!token.is_cancelled());
        extractor
            .extract(&window_for(text_message(2, "alice", "hi")))
            .await
            .unwrap();
        assert!(token.is_cancelled());
        assert_eq!(extractor.extracted_ids().await, vec![1, 2]);
    }
}
