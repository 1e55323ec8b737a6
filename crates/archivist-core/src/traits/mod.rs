// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod checkpoint;
pub mod extractor;
pub mod source;
pub mod store;

pub use adapter::PluginAdapter;
pub use checkpoint::CheckpointMedium;
pub use extractor::FactExtractor;
pub use source::MessageSource;
pub use store::FactStore;
