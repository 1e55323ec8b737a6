// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serde model of the Telegram Desktop JSON export.
//!
//! Only the fields the analyzer reads are modelled; everything else in a
//! record (media, forwards, reactions) is ignored.

use serde::Deserialize;

/// Top-level export document.
#[derive(Debug, Deserialize)]
pub struct RawExport {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub chat_type: Option<String>,
    pub id: i64,
    #[serde(default)]
    pub messages: Vec<RawRecord>,
}

/// One entry of `messages`, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawRecord {
    Message(RawMessage),
    Service(RawService),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_unixtime: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_id: Option<String>,
    #[serde(default)]
    pub text: RawText,
    #[serde(default)]
    pub reply_to_message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawService {
    pub id: i64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_unixtime: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub members: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub text: RawText,
    #[serde(default)]
    pub reply_to_message_id: Option<i64>,
}

/// Message text: a plain string, or a list mixing strings and entities.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawText {
    Plain(String),
    Parts(Vec<RawTextPart>),
}

impl Default for RawText {
    fn default() -> Self {
        RawText::Plain(String::new())
    }
}

impl RawText {
    /// Concatenates every part into plain text.
    pub fn flatten(&self) -> String {
        match self {
            RawText::Plain(s) => s.clone(),
            RawText::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    RawTextPart::Plain(s) => s.as_str(),
                    RawTextPart::Entity(e) => e.text.as_str(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawTextPart {
    Plain(String),
    Entity(RawEntity),
}

/// A formatted span such as `bold`, `link`, or `mention`.
#[derive(Debug, Deserialize)]
pub struct RawEntity {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: String,
}
