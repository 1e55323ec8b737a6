// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for messages, transcripts, and candidate facts.

use archivist_core::{CandidateFact, Message, Transcript};
use chrono::{DateTime, TimeZone, Utc};

/// Chat id used by [`transcript`] when none is given.
pub const TEST_CHAT_ID: i64 = 4242;

fn timestamp(id: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + id * 60, 0)
        .single()
        .unwrap_or_default()
}

/// A plain text message from `sender` (used as both id and display name).
pub fn text_message(id: i64, sender: &str, text: &str) -> Message {
    Message {
        id,
        timestamp: timestamp(id),
        sender_id: Some(sender.to_string()),
        sender_name: Some(sender.to_string()),
        text: text.to_string(),
        reply_to_id: None,
        is_service: false,
    }
}

/// A text message replying to `reply_to`.
pub fn reply(id: i64, sender: &str, text: &str, reply_to: i64) -> Message {
    Message {
        reply_to_id: Some(reply_to),
        ..text_message(id, sender, text)
    }
}

/// A message without a sender (deleted account, anonymous admin).
pub fn anonymous(id: i64, text: &str) -> Message {
    Message {
        sender_id: None,
        sender_name: None,
        ..text_message(id, "", text)
    }
}

/// A service record, e.g. a join or a pin.
pub fn service_message(id: i64, actor: &str, text: &str) -> Message {
    Message {
        is_service: true,
        ..text_message(id, actor, text)
    }
}

/// `count` text messages with ids `1..=count`, alternating between two senders.
pub fn chat(count: i64) -> Vec<Message> {
    (1..=count)
        .map(|id| {
            let sender = if id % 2 == 1 { "alice" } else { "bob" };
            text_message(id, sender, &format!("message {id}"))
        })
        .collect()
}

/// Wraps `messages` in a transcript with [`TEST_CHAT_ID`].
pub fn transcript(messages: Vec<Message>) -> Transcript {
    Transcript {
        chat_id: TEST_CHAT_ID,
        name: "Test Chat".into(),
        chat_type: "private_group".into(),
        messages,
    }
}

/// A candidate fact backed by `sources`.
pub fn candidate(
    subject: &str,
    key: &str,
    value: &str,
    confidence: f64,
    sources: &[i64],
) -> CandidateFact {
    CandidateFact {
        subject_user_id: subject.to_string(),
        attribute_key: key.to_string(),
        value: value.to_string(),
        confidence,
        source_message_ids: sources.iter().copied().collect(),
    }
}
