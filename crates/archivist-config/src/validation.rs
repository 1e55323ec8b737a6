// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as numeric ranges, non-empty paths, and overlapping attribute schemas.

use std::collections::BTreeSet;

use archivist_core::types::normalize_key;

use crate::diagnostic::ConfigError;
use crate::model::ArchivistConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns every failure found rather than stopping at the first.
pub fn validate_config(config: &ArchivistConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |key: String, message: String| errors.push(ConfigError::invalid(key, message));
    let at_least_one = "must be at least 1".to_string();

    let pipeline = &config.pipeline;
    if pipeline.checkpoint_interval == 0 {
        fail("pipeline.checkpoint_interval".into(), at_least_one.clone());
    }
    if pipeline.concurrency == 0 {
        fail("pipeline.concurrency".into(), at_least_one.clone());
    }
    if pipeline.max_attempts == 0 {
        fail("pipeline.max_attempts".into(), at_least_one.clone());
    }
    if pipeline.max_backoff_ms < pipeline.initial_backoff_ms {
        fail(
            "pipeline.max_backoff_ms".into(),
            format!(
                "({}) must not be below initial_backoff_ms ({})",
                pipeline.max_backoff_ms, pipeline.initial_backoff_ms
            ),
        );
    }
    if pipeline.extraction_timeout_secs == 0 {
        fail("pipeline.extraction_timeout_secs".into(), at_least_one.clone());
    }
    if pipeline.storage_timeout_secs == 0 {
        fail("pipeline.storage_timeout_secs".into(), at_least_one.clone());
    }

    let reconcile = &config.reconcile;
    if !(0.0..=1.0).contains(&reconcile.tie_tolerance) {
        fail(
            "reconcile.tie_tolerance".into(),
            format!("must be within [0, 1], got {}", reconcile.tie_tolerance),
        );
    }
    if !(reconcile.recency_half_life > 0.0) {
        fail(
            "reconcile.recency_half_life".into(),
            format!("must be positive, got {}", reconcile.recency_half_life),
        );
    }
    if let Some(threshold) = reconcile.fuzzy_threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            fail(
                "reconcile.fuzzy_threshold".into(),
                format!("must be within (0, 1], got {threshold}"),
            );
        }
    }

    let singletons: BTreeSet<String> = reconcile
        .singleton_keys
        .iter()
        .map(|k| normalize_key(k))
        .collect();
    for (i, key) in reconcile.multi_valued_keys.iter().enumerate() {
        let normalized = normalize_key(key);
        if singletons.contains(&normalized) {
            fail(
                format!("reconcile.multi_valued_keys[{i}]"),
                format!("repeats `{normalized}` from singleton_keys"),
            );
        }
    }
    let listed = [
        ("singleton_keys", &reconcile.singleton_keys),
        ("multi_valued_keys", &reconcile.multi_valued_keys),
    ];
    for (list, keys) in listed {
        for (i, key) in keys.iter().enumerate() {
            if normalize_key(key).is_empty() {
                fail(
                    format!("reconcile.{list}[{i}]"),
                    format!("`{key}` is empty after normalization"),
                );
            }
        }
    }

    for (i, group) in reconcile.aliases.iter().enumerate() {
        if group.len() < 2 {
            fail(
                format!("reconcile.aliases[{i}]"),
                "must list at least two equivalent values".to_string(),
            );
        }
    }

    let ollama = &config.ollama;
    if !(0.0..=1.0).contains(&ollama.default_confidence) {
        fail(
            "ollama.default_confidence".into(),
            format!("must be within [0, 1], got {}", ollama.default_confidence),
        );
    }
    if ollama.base_url.trim().is_empty() {
        fail("ollama.base_url".into(), "must not be empty".to_string());
    }
    if ollama.model.trim().is_empty() {
        fail("ollama.model".into(), "must not be empty".to_string());
    }
    if ollama.timeout_secs == 0 {
        fail("ollama.timeout_secs".into(), at_least_one);
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path".into(), "must not be empty".to_string());
    }
    if config.storage.state_dir.trim().is_empty() {
        fail("storage.state_dir".into(), "must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
