// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama fact extractor adapter for Archivist.
//!
//! This crate implements [`FactExtractor`] against a local Ollama server's
//! native `/api/generate` endpoint in JSON mode.

pub mod client;
pub mod parse;
pub mod prompt;
pub mod types;

use std::time::Duration;

use archivist_config::model::OllamaConfig;
use archivist_core::error::ArchivistError;
use archivist_core::traits::{FactExtractor, PluginAdapter};
use archivist_core::types::{AdapterType, CandidateFact, ContextWindow, HealthStatus};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::OllamaClient;

/// Fact extractor backed by a local Ollama model.
pub struct OllamaExtractor {
    client: OllamaClient,
    default_confidence: f64,
}

impl OllamaExtractor {
    /// Creates an extractor from the `[ollama]` config section.
    pub fn new(config: &OllamaConfig) -> Result<Self, ArchivistError> {
        let client = OllamaClient::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            client,
            default_confidence: config.default_confidence,
        })
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

#[async_trait]
impl PluginAdapter for OllamaExtractor {
    fn name(&self) -> &str {
        "ollama"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extractor
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        match self.client.list_models().await {
            Ok(models) if models.iter().any(|m| m == self.client.model()) => {
                Ok(HealthStatus::Healthy)
            }
            Ok(_) => Ok(HealthStatus::Degraded(format!(
                "model `{}` is not pulled (run `ollama pull {}`)",
                self.client.model(),
                self.client.model()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Ollama unreachable at {}: {e}",
                self.client.base_url()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl FactExtractor for OllamaExtractor {
    async fn extract(&self, window: &ContextWindow) -> Result<Vec<CandidateFact>, ArchivistError> {
        let Some(target) = window.target() else {
            return Err(ArchivistError::Internal(format!(
                "context window for {} does not contain its target",
                window.target_id
            )));
        };
        let Some(subject) = target.sender_id.clone() else {
            debug!(message_id = window.target_id, "target has no sender, nothing to extract");
            return Ok(Vec::new());
        };

        let prompt = prompt::build_prompt(window);
        let raw = self.client.generate(prompt).await?;
        let candidates =
            parse::parse_candidates(&raw, window, &subject, self.default_confidence).inspect_err(
                |e| warn!(message_id = window.target_id, error = %e, "undecodable model output"),
            )?;

        debug!(
            message_id = window.target_id,
            subject = %subject,
            count = candidates.len(),
            "extracted candidate facts"
        );
        Ok(candidates)
    }
}
