// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion from the raw export model to a [`Transcript`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use archivist_core::types::{Message, Transcript};
use archivist_core::{AdapterType, ArchivistError, HealthStatus, MessageSource, PluginAdapter};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::model::{RawExport, RawMessage, RawRecord, RawService};

/// A Telegram export, either on disk or already parsed.
#[derive(Debug, Clone)]
pub struct TelegramExport {
    origin: Origin,
}

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Parsed(Transcript),
}

impl TelegramExport {
    /// An export read lazily from `path` on [`MessageSource::load`].
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::File(path.into()),
        }
    }

    /// The file this export reads, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::File(path) => Some(path),
            Origin::Parsed(_) => None,
        }
    }
}

impl FromStr for TelegramExport {
    type Err = ArchivistError;

    /// Parses export JSON eagerly.
    fn from_str(json: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            origin: Origin::Parsed(parse_export(json)?),
        })
    }
}

fn parse_error(message: String, source: Option<Box<dyn std::error::Error + Send + Sync>>) -> ArchivistError {
    ArchivistError::Parse { message, source }
}

/// Parses Telegram export JSON into a transcript.
///
/// Records of unknown type are skipped. Message order is kept as exported.
pub fn parse_export(json: &str) -> Result<Transcript, ArchivistError> {
    let raw: RawExport = serde_json::from_str(json).map_err(|e| {
        parse_error(
            format!("invalid Telegram export JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;

    let mut messages = Vec::with_capacity(raw.messages.len());
    let mut skipped = 0usize;
    for record in raw.messages {
        match record {
            RawRecord::Message(m) => messages.push(convert_message(m)?),
            RawRecord::Service(s) => messages.push(convert_service(s)?),
            RawRecord::Unknown => {
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        debug!(skipped, "skipped export records of unknown type");
    }

    Ok(Transcript {
        chat_id: raw.id,
        name: raw.name.unwrap_or_default(),
        chat_type: raw.chat_type.unwrap_or_default(),
        messages,
    })
}

fn convert_message(raw: RawMessage) -> Result<Message, ArchivistError> {
    Ok(Message {
        id: raw.id,
        timestamp: parse_timestamp(raw.id, raw.date_unixtime.as_deref(), raw.date.as_deref())?,
        sender_id: raw.from_id,
        sender_name: raw.from,
        text: raw.text.flatten(),
        reply_to_id: raw.reply_to_message_id,
        is_service: false,
    })
}

fn convert_service(raw: RawService) -> Result<Message, ArchivistError> {
    let timestamp = parse_timestamp(raw.id, raw.date_unixtime.as_deref(), raw.date.as_deref())?;
    let text = describe_service(&raw);
    Ok(Message {
        id: raw.id,
        timestamp,
        sender_id: raw.actor_id,
        sender_name: raw.actor,
        text,
        reply_to_id: raw.reply_to_message_id,
        is_service: true,
    })
}

/// Human-readable text for a service record, e.g. `invite members: Alice, Bob`.
fn describe_service(raw: &RawService) -> String {
    let mut text = raw
        .action
        .as_deref()
        .unwrap_or("service action")
        .replace('_', " ");

    if let Some(title) = raw.title.as_deref().filter(|t| !t.is_empty()) {
        text.push_str(": ");
        text.push_str(title);
    }
    if let Some(members) = &raw.members {
        let names: Vec<&str> = members.iter().flatten().map(String::as_str).collect();
        if !names.is_empty() {
            text.push_str(": ");
            text.push_str(&names.join(", "));
        }
    }
    let extra = raw.text.flatten();
    if !extra.trim().is_empty() {
        text.push_str(" - ");
        text.push_str(extra.trim());
    }
    text
}

/// Prefers `date_unixtime`; falls back to the local-time `date` read as UTC.
fn parse_timestamp(
    id: i64,
    unixtime: Option<&str>,
    date: Option<&str>,
) -> Result<DateTime<Utc>, ArchivistError> {
    if let Some(secs) = unixtime {
        let secs: i64 = secs.trim().parse().map_err(|e| {
            parse_error(
                format!("message {id}: invalid date_unixtime `{secs}`"),
                Some(Box::new(e)),
            )
        })?;
        return Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
            parse_error(format!("message {id}: date_unixtime {secs} out of range"), None)
        });
    }
    if let Some(date) = date {
        let naive = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S").map_err(|e| {
            parse_error(
                format!("message {id}: invalid date `{date}`"),
                Some(Box::new(e)),
            )
        })?;
        return Ok(naive.and_utc());
    }
    Err(parse_error(format!("message {id}: missing date"), None))
}

#[async_trait]
impl PluginAdapter for TelegramExport {
    fn name(&self) -> &str {
        "telegram-export"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, ArchivistError> {
        match &self.origin {
            Origin::File(path) if !path.exists() => Ok(HealthStatus::Unhealthy(format!(
                "chat export {} not found",
                path.display()
            ))),
            _ => Ok(HealthStatus::Healthy),
        }
    }

    async fn shutdown(&self) -> Result<(), ArchivistError> {
        Ok(())
    }
}

#[async_trait]
impl MessageSource for TelegramExport {
    async fn load(&self) -> Result<Transcript, ArchivistError> {
        let path = match &self.origin {
            Origin::Parsed(transcript) => return Ok(transcript.clone()),
            Origin::File(path) => path,
        };

        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            parse_error(
                format!("cannot read chat export {}: {e}", path.display()),
                Some(Box::new(e)),
            )
        })?;
        let transcript = parse_export(&json)?;
        info!(
            path = %path.display(),
            chat = %transcript.name,
            messages = transcript.messages.len(),
            "loaded chat export"
        );
        Ok(transcript)
    }
}
