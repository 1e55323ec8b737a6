// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./archivist.toml` > `~/.config/archivist/archivist.toml` >
//! `/etc/archivist/archivist.toml` with environment variable overrides via `ARCHIVIST_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ArchivistConfig;

/// Config sections addressable from the environment.
const SECTIONS: &[&str] = &["app", "context", "pipeline", "reconcile", "ollama", "storage"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/archivist/archivist.toml` (system-wide)
/// 3. `~/.config/archivist/archivist.toml` (user XDG config)
/// 4. `./archivist.toml` (local directory)
/// 5. `ARCHIVIST_*` environment variables
pub fn load_config() -> Result<ArchivistConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ArchivistConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ArchivistConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ArchivistConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ArchivistConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ArchivistConfig::default()))
        .merge(Toml::file("/etc/archivist/archivist.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("archivist/archivist.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("archivist.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `ARCHIVIST_PIPELINE_STORAGE_TIMEOUT_SECS` must map to
/// `pipeline.storage_timeout_secs`.
fn env_provider() -> Env {
    Env::prefixed("ARCHIVIST_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env key to its dotted config path.
///
/// Only the leading section name is split off.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_the_section_only() {
        assert_eq!(
            map_env_key("pipeline_storage_timeout_secs"),
            "pipeline.storage_timeout_secs"
        );
        assert_eq!(map_env_key("ollama_base_url"), "ollama.base_url");
        assert_eq!(map_env_key("app_log_level"), "app.log_level");
        assert_eq!(map_env_key("storage_state_dir"), "storage.state_dir");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[ollama]
model = "llama3:8b"
timeout_secs = 60
"#,
            )?;
            jail.set_env("ARCHIVIST_OLLAMA_TIMEOUT_SECS", "15");
            jail.set_env("ARCHIVIST_PIPELINE_MAX_ATTEMPTS", "7");

            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.ollama.model, "llama3:8b");
            assert_eq!(config.ollama.timeout_secs, 15);
            assert_eq!(config.pipeline.max_attempts, 7);
            Ok(())
        });
    }
}
