// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for the Archivist pipeline.
//!
//! Two independent stores live here:
//! - **Facts**: WAL-mode SQLite with embedded migrations, written through
//!   `tokio-rusqlite`'s single background thread ([`SqliteFactStore`])
//! - **Checkpoints**: one JSON record per chat, replaced atomically
//!   ([`CheckpointStore`] over a [`FileMedium`])

pub mod checkpoint;
pub mod database;
pub mod facts;
pub mod medium;
pub mod migrations;

pub use checkpoint::CheckpointStore;
pub use database::Database;
pub use facts::SqliteFactStore;
pub use medium::FileMedium;
