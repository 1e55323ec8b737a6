// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram Desktop chat export support for Archivist.
//!
//! Reads the `result.json` produced by "Export chat history" (JSON format)
//! and turns it into a [`Transcript`](archivist_core::Transcript).

pub mod export;
pub mod model;

pub use export::{TelegramExport, parse_export};
