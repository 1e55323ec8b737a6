// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Archivist integration tests.
//!
//! Provides in-memory adapters and builders for fast, deterministic tests
//! without an Ollama server or files on disk.
//!
//! # Components
//!
//! - [`MockExtractor`] - scripted per-message extraction outcomes with call counting
//! - [`MemoryFactStore`] - in-memory [`FactStore`](archivist_core::FactStore) with failure injection
//! - [`MemoryMedium`] - in-memory [`CheckpointMedium`](archivist_core::CheckpointMedium)
//! - [`builders`] - messages, transcripts, and candidates

pub mod builders;
pub mod memory_medium;
pub mod memory_store;
pub mod mock_extractor;

pub use memory_medium::MemoryMedium;
pub use memory_store::MemoryFactStore;
pub use mock_extractor::{MockExtractor, Outcome};
