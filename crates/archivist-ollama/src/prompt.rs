// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction prompt rendering.

use std::fmt::Write;

use archivist_core::{ContextWindow, Message};

/// Attribute catalog offered to the model, with a short description each.
pub const ATTRIBUTE_CATALOG: &[(&str, &str)] = &[
    ("real_name", "The user's full real name."),
    ("city", "The city where the user lives or is from."),
    ("country", "The country where the user lives or is from."),
    ("occupation", "The user's profession or job."),
    ("interests", "Hobbies, passions, or topics the user is interested in."),
    ("contact_info", "Any phone numbers, emails, or social media handles."),
    ("skills", "Specific abilities or expertise the user possesses."),
    ("preferences", "User preferences (e.g., favorite food, music, movies)."),
    ("opinions", "Strong opinions or stances on topics."),
    ("relationships", "Mentions of family members, friends, or professional connections."),
    ("goals", "Stated personal or professional goals."),
    ("travel_history", "Places the user has visited or plans to visit."),
    ("education", "Educational background or institutions attended."),
    ("pets", "Information about pets."),
    ("other", "Any other significant factual information that doesn't fit the above."),
];

const INSTRUCTIONS: &str = "\
You are an expert assistant that extracts facts about chat users.
Extract facts only about the sender of the message marked TARGET.
Use the surrounding messages as context, but do not report facts about other people.
Do not make up facts. Only extract what is explicitly stated or strongly implied.
If a fact type is not present, omit it. If several values are found, list each one.";

const OUTPUT_FORMAT: &str = r#"Respond with a single JSON object of this shape:
{"facts": [{"attribute": "city", "value": "Berlin", "confidence": 0.8, "source_message_ids": [12]}]}
`confidence` is a number between 0 and 1. `source_message_ids` lists the ids of the
messages the fact was read from. Respond with {"facts": []} when nothing is found."#;

/// Renders the extraction prompt for `window`.
pub fn build_prompt(window: &ContextWindow) -> String {
    let mut out = String::with_capacity(1024 + window.messages.len() * 80);
    out.push_str(INSTRUCTIONS);
    out.push_str("\n\nChat context:\n---\n");
    for message in &window.messages {
        let marker = if message.id == window.target_id {
            " <== TARGET"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "[{}] {}: {}{marker}",
            message.id,
            speaker(message),
            message.text.replace('\n', " ")
        );
    }
    out.push_str("---\n\nFact types:\n");
    for (key, description) in ATTRIBUTE_CATALOG {
        let _ = writeln!(out, "- {key}: {description}");
    }
    out.push('\n');
    out.push_str(OUTPUT_FORMAT);
    out.push('\n');
    out
}

fn speaker(message: &Message) -> &str {
    message
        .sender_name
        .as_deref()
        .or(message.sender_id.as_deref())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, name: Option<&str>, text: &str) -> Message {
        Message {
            id,
            timestamp: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
            sender_id: name.map(|n| format!("user_{n}")),
            sender_name: name.map(String::from),
            text: text.into(),
            reply_to_id: None,
            is_service: false,
        }
    }

    #[test]
    fn marks_only_the_target_line() {
        let window = ContextWindow {
            target_id: 2,
            messages: vec![
                msg(1, Some("Alice"), "where do you live?"),
                msg(2, Some("Bob"), "Berlin,\nsince 2019"),
                msg(3, None, "cool"),
            ],
        };
        let prompt = build_prompt(&window);
        assert!(prompt.contains("[1] Alice: where do you live?\n"));
        assert!(prompt.contains("[2] Bob: Berlin, since 2019 <== TARGET\n"));
        assert!(prompt.contains("[3] unknown: cool\n"));
        assert_eq!(prompt.matches("<== TARGET").count(), 1);
    }

    #[test]
    fn lists_the_whole_catalog() {
        let window = ContextWindow {
            target_id: 1,
            messages: vec![msg(1, Some("Alice"), "hi")],
        };
        let prompt = build_prompt(&window);
        for (key, _) in ATTRIBUTE_CATALOG {
            assert!(prompt.contains(&format!("- {key}: ")), "missing {key}");
        }
        assert!(prompt.contains("source_message_ids"));
    }
}
