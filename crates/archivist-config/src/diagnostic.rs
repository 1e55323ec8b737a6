// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics rendered with miette.
//!
//! Every problem found while loading `archivist.toml` becomes a
//! [`ConfigError`]. Unknown keys carry a [`KeyHint`]: a close spelling within
//! the section, the section the key really belongs to, or, inside
//! `[reconcile]`, a reminder that attribute names are listed rather than set.
//! Type and validation errors point at the offending key (or the offending
//! element of an array such as `reconcile.aliases`) in the TOML file that
//! set it.

// The Diagnostic derive assigns span fields in a way rustc reports as unused.
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a spelling suggestion.
const SPELLING_THRESHOLD: f64 = 0.8;

/// Every section of `archivist.toml` and the keys it accepts.
pub const SECTIONS: &[(&str, &[&str])] = &[
    ("app", &["log_level"]),
    ("context", &["half_window", "reply_depth", "same_sender_only"]),
    (
        "pipeline",
        &[
            "include_service_messages",
            "checkpoint_interval",
            "concurrency",
            "max_attempts",
            "initial_backoff_ms",
            "max_backoff_ms",
            "extraction_timeout_secs",
            "storage_timeout_secs",
        ],
    ),
    (
        "reconcile",
        &[
            "singleton_keys",
            "multi_valued_keys",
            "aliases",
            "tie_tolerance",
            "recency_half_life",
            "fuzzy_threshold",
        ],
    ),
    (
        "ollama",
        &["base_url", "model", "timeout_secs", "default_confidence"],
    ),
    ("storage", &["database_path", "state_dir", "wal_mode"]),
];

/// What an unknown key most likely meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyHint {
    /// A close spelling of a key in the same section.
    Spelling(String),
    /// The key exists, but in this other section.
    OtherSection(&'static str),
    /// An attribute name written as a `[reconcile]` setting.
    AttributeName,
}

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(archivist::config::unknown_key),
        help("{}", unknown_key_help(key, section.as_deref(), hint.as_ref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Section the key appeared in; `None` for a top-level table.
        section: Option<String>,
        hint: Option<KeyHint>,
        /// Keys accepted where this one appeared, comma separated.
        valid_keys: String,
        #[label("not recognized here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(archivist::config::invalid_type))]
    InvalidType {
        /// Dotted path, e.g. `context.half_window`.
        key: String,
        detail: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that deserialized but breaks a semantic rule.
    #[error("`{key}` {message}")]
    #[diagnostic(code(archivist::config::invalid_value))]
    Validation {
        /// Dotted path, optionally indexed: `reconcile.aliases[1]`.
        key: String,
        message: String,
        #[label("{message}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(archivist::config::other))]
    Other(String),
}

impl ConfigError {
    /// A validation failure for `key`, located later by [`attach_spans`].
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
            span: None,
            src: None,
        }
    }

    /// The dotted config path the error is about, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownKey { key, .. }
            | Self::InvalidType { key, .. }
            | Self::Validation { key, .. } => Some(key.as_str()),
            Self::Other(_) => None,
        }
    }
}

fn unknown_key_help(
    key: &str,
    section: Option<&str>,
    hint: Option<&KeyHint>,
    valid_keys: &str,
) -> String {
    match (hint, section) {
        (Some(KeyHint::Spelling(s)), _) => format!("did you mean `{s}`?"),
        (Some(KeyHint::OtherSection(home)), _) => {
            format!("`{key}` belongs in the [{home}] section")
        }
        (Some(KeyHint::AttributeName), _) => format!(
            "attribute names are listed, not set: add \"{key}\" to `singleton_keys` or `multi_valued_keys`"
        ),
        (None, Some(section)) => format!("valid keys in [{section}]: {valid_keys}"),
        (None, None) => format!("valid sections: {valid_keys}"),
    }
}

/// The section that declares `key`, if any.
fn home_section(key: &str) -> Option<&'static str> {
    SECTIONS
        .iter()
        .find(|(_, keys)| keys.contains(&key))
        .map(|(section, _)| *section)
}

/// Works out what an unknown `key` in `section` was probably meant to be.
///
/// `expected` lists the keys accepted at that position.
pub fn hint_for(section: Option<&str>, key: &str, expected: &[&str]) -> Option<KeyHint> {
    if let Some(home) = home_section(key).filter(|home| Some(*home) != section) {
        return Some(KeyHint::OtherSection(home));
    }

    let closest = expected
        .iter()
        .map(|candidate| (strsim::jaro_winkler(key, candidate), *candidate))
        .filter(|(score, _)| *score >= SPELLING_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0));
    if let Some((_, candidate)) = closest {
        return Some(KeyHint::Spelling(candidate.to_string()));
    }

    (section == Some("reconcile")).then_some(KeyHint::AttributeName)
}

/// Convert a `figment::Error` into one `ConfigError` per underlying error.
///
/// `toml_sources` are `(name, content)` pairs used to attach source spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let sources = sources_for(&error, toml_sources);
            let path: Vec<&str> = error.path.iter().map(String::as_str).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let section = path.first().copied();
                    let key = match section {
                        Some(section) => format!("{section}.{field}"),
                        None => field.clone(),
                    };
                    let (span, src) = locate(&key, sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section.map(str::to_string),
                        hint: hint_for(section, field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(actual, expected) => {
                    let key = path.join(".");
                    let (span, src) = locate(&key, sources);
                    ConfigError::InvalidType {
                        key,
                        detail: format!("found {actual}, expected {expected}"),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Points validation errors at the key that set the bad value.
///
/// `sources` are searched in order, so list the highest-precedence file
/// first. Values that came from the environment stay unlocated.
pub fn attach_spans(errors: Vec<ConfigError>, sources: &[(String, String)]) -> Vec<ConfigError> {
    errors
        .into_iter()
        .map(|error| match error {
            ConfigError::Validation {
                key,
                message,
                span: None,
                ..
            } => {
                let (span, src) = locate(&key, sources);
                ConfigError::Validation {
                    key,
                    message,
                    span,
                    src,
                }
            }
            other => other,
        })
        .collect()
}

/// The sources a figment error may have come from.
fn sources_for<'a>(
    error: &figment::error::Error,
    sources: &'a [(String, String)],
) -> &'a [(String, String)] {
    let origin = error.metadata.as_ref().and_then(|m| m.source.as_ref());
    match origin {
        Some(figment::Source::File(path)) => {
            let path = path.display().to_string();
            match sources.iter().position(|(name, _)| *name == path) {
                Some(i) => &sources[i..=i],
                None => &sources[..0],
            }
        }
        // Inline strings carry no file; any source may be the one.
        _ => sources,
    }
}

/// Finds the dotted `path` (`section.key` or `section.key[i]`) in `sources`.
fn locate(
    path: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let (section, rest) = match path.split_once('.') {
        Some((section, rest)) => (Some(section), rest),
        None => (None, path),
    };
    let (field, index) = match rest.split_once('[') {
        Some((field, index)) => (field, index.trim_end_matches(']').parse::<usize>().ok()),
        None => (rest, None),
    };

    for (name, content) in sources {
        if let Some(at) = key_offset(content, section, field) {
            let span = index
                .and_then(|i| element_span(content, at, i))
                .unwrap_or_else(|| SourceSpan::new(at.into(), field.len()));
            return (Some(span), Some(NamedSource::new(name, content.clone())));
        }
    }
    (None, None)
}

/// Name of a `[table]` header line, if `line` is one.
fn table_header(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('[')?;
    let name = inner[..inner.find(']')?].trim();
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    bare.then_some(name)
}

/// Byte offset of `field` inside `[section]` of a TOML document.
///
/// With `section = None`, `field` is a table name and the offset is that of
/// the name inside its header. Array rows such as `["a", "b"],` are not
/// mistaken for headers.
pub fn key_offset(content: &str, section: Option<&str>, field: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();
        if let Some(name) = table_header(trimmed) {
            if section.is_none() && name == field {
                return Some(offset + indent + trimmed.find(name)?);
            }
            current = Some(name);
        } else if section.is_some() && current == section {
            let assigns = trimmed
                .strip_prefix(field)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if assigns {
                return Some(offset + indent);
            }
        }
        offset += line.len();
    }
    None
}

/// Span of the `index`-th element of the array assigned at `key_at`.
fn element_span(content: &str, key_at: usize, index: usize) -> Option<SourceSpan> {
    let after_key = &content[key_at..];
    let eq = after_key.find('=')?;
    let open = key_at + eq + after_key[eq..].find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut element = 0usize;
    let mut start: Option<usize> = None;
    let mut end = open;
    for (i, c) in content[open..].char_indices() {
        let at = open + i;
        if in_string {
            if c == '"' {
                in_string = false;
                end = at + 1;
            }
            continue;
        }
        if depth == 1 && start.is_none() && !c.is_whitespace() && !matches!(c, ',' | ']') {
            start = Some(at);
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (element == index)
                        .then(|| start.map(|s| SourceSpan::new(s.into(), end - s)))
                        .flatten();
                }
            }
            ',' if depth == 1 => {
                if element == index {
                    return start.map(|s| SourceSpan::new(s.into(), end - s));
                }
                element += 1;
                start = None;
                continue;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            end = at + c.len_utf8();
        }
    }
    None
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
