// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Archivist chat analyzer.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use archivist_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Model: {}", config.ollama.model);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, KeyHint, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ArchivistConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment errors are converted to diagnostics with source spans and key
/// hints. Validation errors are collected in full and located in the file
/// that set them.
pub fn load_and_validate() -> Result<ArchivistConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => validated(config, collect_toml_sources),
        Err(err) => {
            let toml_sources = collect_toml_sources();
            Err(diagnostic::figment_to_config_errors(err, &toml_sources))
        }
    }
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<ArchivistConfig, Vec<ConfigError>> {
    let sources = || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    };
    match loader::load_config_from_path(path) {
        Ok(config) => validated(config, sources),
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<ArchivistConfig, Vec<ConfigError>> {
    let sources = || vec![("<inline>".to_string(), toml_content.to_string())];
    match loader::load_config_from_str(toml_content) {
        Ok(config) => validated(config, sources),
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// Validates `config`, reading `sources` only to locate failures.
fn validated(
    config: ArchivistConfig,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<ArchivistConfig, Vec<ConfigError>> {
    match validation::validate_config(&config) {
        Ok(()) => Ok(config),
        Err(errors) => Err(diagnostic::attach_spans(errors, &sources())),
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut sources = Vec::new();

    if let Ok(content) = std::fs::read_to_string("archivist.toml") {
        let path = std::env::current_dir()
            .map(|d| d.join("archivist.toml").display().to_string())
            .unwrap_or_else(|_| "archivist.toml".to_string());
        sources.push((path, content));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("archivist/archivist.toml");
        if let Ok(content) = std::fs::read_to_string(&path) {
            sources.push((path.display().to_string(), content));
        }
    }

    let system_path = Path::new("/etc/archivist/archivist.toml");
    if let Ok(content) = std::fs::read_to_string(system_path) {
        sources.push((system_path.display().to_string(), content));
    }

    tracing::debug!(count = sources.len(), "collected config sources for diagnostics");
    sources
}
