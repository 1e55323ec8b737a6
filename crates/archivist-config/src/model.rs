// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Archivist chat analyzer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Archivist configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchivistConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Context window assembly.
    #[serde(default)]
    pub context: ContextConfig,

    /// Orchestrator retry, batching, and concurrency policy.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Fact reconciliation policy.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Local Ollama extraction backend.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Fact database and checkpoint locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Context window assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Messages taken on each side of the target.
    #[serde(default = "default_half_window")]
    pub half_window: usize,

    /// Maximum reply hops followed from the target.
    #[serde(default = "default_reply_depth")]
    pub reply_depth: usize,

    /// Keep only surrounding messages from the target's sender.
    #[serde(default)]
    pub same_sender_only: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            half_window: default_half_window(),
            reply_depth: default_reply_depth(),
            same_sender_only: false,
        }
    }
}

fn default_half_window() -> usize {
    5
}

fn default_reply_depth() -> usize {
    3
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Send service messages (joins, pins) to the extractor.
    /// When false they still advance the checkpoint.
    #[serde(default)]
    pub include_service_messages: bool,

    /// Save the checkpoint after this many committed messages.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Extraction calls allowed in flight ahead of the commit cursor.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts per extraction or storage call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single retry delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-call timeout for the extractor.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Per-call timeout for the fact store.
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            include_service_messages: false,
            checkpoint_interval: default_checkpoint_interval(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            storage_timeout_secs: default_storage_timeout_secs(),
        }
    }
}

fn default_checkpoint_interval() -> usize {
    25
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_extraction_timeout_secs() -> u64 {
    120
}

fn default_storage_timeout_secs() -> u64 {
    30
}

/// Fact reconciliation policy.
///
/// Attribute keys are compared after normalization, so `"Real Name"` and
/// `real_name` refer to the same key.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Keys holding exactly one current value per user.
    #[serde(default = "default_singleton_keys")]
    pub singleton_keys: Vec<String>,

    /// Keys holding a set of values per user.
    #[serde(default = "default_multi_valued_keys")]
    pub multi_valued_keys: Vec<String>,

    /// Groups of values treated as equivalent, e.g. `["nyc", "new york city"]`.
    #[serde(default)]
    pub aliases: Vec<Vec<String>>,

    /// Score difference at or below which a conflict keeps the stored value.
    #[serde(default = "default_tie_tolerance")]
    pub tie_tolerance: f64,

    /// Message-id distance over which the older side of a conflict loses half its weight.
    #[serde(default = "default_recency_half_life")]
    pub recency_half_life: f64,

    /// Jaro-Winkler similarity at or above which multi-valued values are
    /// merged. Unset disables fuzzy matching.
    #[serde(default)]
    pub fuzzy_threshold: Option<f64>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            singleton_keys: default_singleton_keys(),
            multi_valued_keys: default_multi_valued_keys(),
            aliases: Vec::new(),
            tie_tolerance: default_tie_tolerance(),
            recency_half_life: default_recency_half_life(),
            fuzzy_threshold: None,
        }
    }
}

fn default_singleton_keys() -> Vec<String> {
    ["real_name", "city", "country", "occupation", "education"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_multi_valued_keys() -> Vec<String> {
    [
        "interests",
        "skills",
        "contact_info",
        "preferences",
        "opinions",
        "relationships",
        "goals",
        "travel_history",
        "pets",
        "other",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tie_tolerance() -> f64 {
    0.05
}

fn default_recency_half_life() -> f64 {
    500.0
}

/// Ollama extraction backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model used for extraction.
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// HTTP timeout for a single generate call.
    #[serde(default = "default_ollama_timeout_secs")]
    pub timeout_secs: u64,

    /// Confidence assigned to facts the model returns without one.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout_secs(),
            default_confidence: default_confidence(),
        }
    }
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "gemma3n:latest".to_string()
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

fn default_confidence() -> f64 {
    0.6
}

/// Storage locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite fact database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory holding one checkpoint file per chat.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            state_dir: default_state_dir(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("archivist").join("facts.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("data/facts.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_state_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("archivist").join("state"))
        .unwrap_or_else(|| std::path::PathBuf::from("data/state"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}
