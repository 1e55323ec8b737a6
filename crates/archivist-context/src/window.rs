// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Window construction over an id-ordered message sequence.

use std::collections::{BTreeMap, HashMap, HashSet};

use archivist_config::model::ContextConfig;
use archivist_core::types::{ContextWindow, Message};
use tracing::warn;

/// Shape of a context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    /// Neighbours taken on each side of the target.
    pub half_window: usize,
    /// Maximum reply hops followed from the target.
    pub reply_depth: usize,
    /// Keep only neighbours sent by the target's sender.
    pub same_sender_only: bool,
}

impl WindowSpec {
    pub fn new(half_window: usize, reply_depth: usize) -> Self {
        Self {
            half_window,
            reply_depth,
            same_sender_only: false,
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for WindowSpec {
    fn from(config: &ContextConfig) -> Self {
        Self {
            half_window: config.half_window,
            reply_depth: config.reply_depth,
            same_sender_only: config.same_sender_only,
        }
    }
}

/// Builds context windows over one chat's messages.
///
/// The builder owns an id-sorted, duplicate-free copy of the sequence plus an
/// id index, so each `build` is a slice plus a bounded walk.
#[derive(Debug, Clone)]
pub struct ContextWindowBuilder {
    messages: Vec<Message>,
    index: HashMap<i64, usize>,
}

impl ContextWindowBuilder {
    /// Creates a builder, sorting by id and keeping the first occurrence of
    /// each duplicated id.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut messages: Vec<Message> = messages.into_iter().collect();

        if !messages.windows(2).all(|pair| pair[0].id < pair[1].id) {
            let before = messages.len();
            // Stable sort so `dedup_by_key` keeps the first occurrence.
            messages.sort_by_key(|m| m.id);
            messages.dedup_by_key(|m| m.id);
            warn!(
                dropped_duplicates = before - messages.len(),
                "message sequence was not strictly ordered by id; sorted it"
            );
        }

        let index = messages
            .iter()
            .enumerate()
            .map(|(pos, m)| (m.id, pos))
            .collect();

        Self { messages, index }
    }

    /// The normalized sequence the builder works over.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Message> {
        self.index.get(&id).map(|&pos| &self.messages[pos])
    }

    /// Builds the window around `target_id`.
    ///
    /// Returns `None` only when `target_id` is not in the sequence. The result
    /// always contains the target and is ordered by id without duplicates.
    pub fn build(&self, target_id: i64, spec: &WindowSpec) -> Option<ContextWindow> {
        let pos = *self.index.get(&target_id)?;
        let target = &self.messages[pos];

        let mut picked: BTreeMap<i64, &Message> = BTreeMap::new();

        let start = pos.saturating_sub(spec.half_window);
        let end = pos
            .saturating_add(spec.half_window)
            .saturating_add(1)
            .min(self.messages.len());
        for msg in &self.messages[start..end] {
            if msg.id == target_id || !spec.same_sender_only || same_sender(target, msg) {
                picked.insert(msg.id, msg);
            }
        }

        for msg in self.reply_chain(target, spec.reply_depth) {
            picked.insert(msg.id, msg);
        }

        Some(ContextWindow {
            target_id,
            messages: picked.into_values().cloned().collect(),
        })
    }

    /// Walks `reply_to_id` links from `from`, at most `depth` hops.
    ///
    /// Stops at a missing parent or at any id already visited (the start
    /// message included), so self-replies and cycles terminate.
    fn reply_chain<'a>(&'a self, from: &'a Message, depth: usize) -> Vec<&'a Message> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([from.id]);
        let mut current = from;

        for _ in 0..depth {
            let Some(parent_id) = current.reply_to_id else {
                break;
            };
            if !visited.insert(parent_id) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            chain.push(parent);
            current = parent;
        }

        chain
    }
}

/// A target without a sender matches nobody.
fn same_sender(target: &Message, other: &Message) -> bool {
    match (&target.sender_id, &other.sender_id) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
