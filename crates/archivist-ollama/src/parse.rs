// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of model output into candidate facts.
//!
//! Two shapes are accepted:
//!
//! * `{"facts": [{"attribute", "value", "confidence", "source_message_ids"}]}`
//! * the legacy map of lists, `{"city": ["Berlin"], "interests": ["chess", "go"]}`
//!
//! Markdown code fences around the document are stripped first.

use std::collections::BTreeSet;

use archivist_core::{ArchivistError, CandidateFact, ContextWindow};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(alias = "key", alias = "type")]
    attribute: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "sources", alias = "message_ids")]
    source_message_ids: Vec<i64>,
}

/// Decodes `raw` into candidates about `subject`.
///
/// Sources outside the window are dropped; a fact left without sources is
/// attributed to the target message. Candidates are not validated here.
pub fn parse_candidates(
    raw: &str,
    window: &ContextWindow,
    subject: &str,
    default_confidence: f64,
) -> Result<Vec<CandidateFact>, ArchivistError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let document: Value =
        serde_json::from_str(body).map_err(|e| ArchivistError::PermanentExtraction {
            message: format!("model output is not valid JSON: {e}"),
        })?;

    let Value::Object(mut map) = document else {
        return Err(ArchivistError::PermanentExtraction {
            message: "model output is not a JSON object".into(),
        });
    };

    let in_window: BTreeSet<i64> = window.ids().into_iter().collect();
    let sources_for = |ids: Vec<i64>| -> BTreeSet<i64> {
        let kept: BTreeSet<i64> = ids.into_iter().filter(|id| in_window.contains(id)).collect();
        if kept.is_empty() {
            BTreeSet::from([window.target_id])
        } else {
            kept
        }
    };

    let mut candidates = Vec::new();

    if let Some(facts) = map.remove("facts") {
        let facts: Vec<RawFact> =
            serde_json::from_value(facts).map_err(|e| ArchivistError::PermanentExtraction {
                message: format!("malformed `facts` array: {e}"),
            })?;
        for fact in facts {
            for value in scalar_values(fact.value) {
                candidates.push(CandidateFact {
                    subject_user_id: subject.to_string(),
                    attribute_key: fact.attribute.clone(),
                    value,
                    confidence: fact.confidence.unwrap_or(default_confidence),
                    source_message_ids: sources_for(fact.source_message_ids.clone()),
                });
            }
        }
        return Ok(candidates);
    }

    for (attribute, values) in map {
        for value in scalar_values(values) {
            candidates.push(CandidateFact {
                subject_user_id: subject.to_string(),
                attribute_key: attribute.clone(),
                value,
                confidence: default_confidence,
                source_message_ids: BTreeSet::from([window.target_id]),
            });
        }
    }
    debug!(count = candidates.len(), "decoded legacy map-of-lists output");
    Ok(candidates)
}

/// Flattens a JSON value into non-empty string values.
fn scalar_values(value: Value) -> Vec<String> {
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Vec::new()
            } else {
                vec![s]
            }
        }
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items.into_iter().flat_map(scalar_values).collect(),
        Value::Null | Value::Object(_) => Vec::new(),
    }
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_core::Message;
    use chrono::{TimeZone, Utc};

    fn window() -> ContextWindow {
        let messages = (3..=7)
            .map(|id| Message {
                id,
                timestamp: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
                sender_id: Some("user1".into()),
                sender_name: Some("Alice".into()),
                text: format!("message {id}"),
                reply_to_id: None,
                is_service: false,
            })
            .collect();
        ContextWindow {
            target_id: 5,
            messages,
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn parses_facts_shape() {
        let raw = r#"{"facts":[
            {"attribute":"city","value":"Berlin","confidence":0.9,"source_message_ids":[4,5]},
            {"attribute":"interests","value":["chess","go"]}
        ]}"#;
        let facts = parse_candidates(raw, &window(), "user1", 0.6).unwrap();
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].attribute_key, "city");
        assert_eq!(facts[0].confidence, 0.9);
        assert_eq!(facts[0].source_message_ids, BTreeSet::from([4, 5]));
        assert_eq!(facts[1].value, "chess");
        assert_eq!(facts[1].confidence, 0.6);
        assert_eq!(facts[1].source_message_ids, BTreeSet::from([5]));
        assert!(facts.iter().all(|f| f.subject_user_id == "user1"));
    }

    #[test]
    fn drops_sources_outside_the_window() {
        let raw = r#"{"facts":[{"attribute":"pets","value":"a cat","source_message_ids":[99]}]}"#;
        let facts = parse_candidates(raw, &window(), "user1", 0.6).unwrap();
        assert_eq!(facts[0].source_message_ids, BTreeSet::from([5]));
    }

    #[test]
    fn parses_legacy_map_of_lists() {
        let raw = "```json\n{\"city\": [\"Paris\"], \"interests\": [\"hiking\", \"\"], \"pets\": []}\n```";
        let facts = parse_candidates(raw, &window(), "user1", 0.6).unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.source_message_ids == BTreeSet::from([5])));
        assert!(facts.iter().all(|f| f.confidence == 0.6));
    }

    #[test]
    fn empty_output_yields_nothing() {
        assert!(parse_candidates("", &window(), "user1", 0.6).unwrap().is_empty());
        assert!(parse_candidates("{\"facts\": []}", &window(), "user1", 0.6).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_json_as_permanent() {
        let err = parse_candidates("I could not find any facts.", &window(), "user1", 0.6)
            .unwrap_err();
        assert!(matches!(err, ArchivistError::PermanentExtraction { .. }));
        assert!(!err.is_transient());

        let err = parse_candidates("[1, 2]", &window(), "user1", 0.6).unwrap_err();
        assert!(matches!(err, ArchivistError::PermanentExtraction { .. }));
    }
}
