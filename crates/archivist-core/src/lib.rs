// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Archivist chat analyzer.
//!
//! This crate provides the domain types, error type, and collaborator traits
//! shared by the pipeline and its adapters. Adapter crates (transcript
//! parser, extractor, storage) implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ArchivistError;
pub use types::{
    AdapterType, CandidateFact, Cardinality, ContextWindow, FactMap, HealthStatus, Message,
    ProcessingCheckpoint, RunStatus, Transcript, UserFact, CHECKPOINT_SCHEMA_VERSION,
};

pub use traits::{CheckpointMedium, FactExtractor, FactStore, MessageSource, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let transient = ArchivistError::TransientExtraction {
            message: "connection refused".into(),
            source: None,
        };
        let timeout = ArchivistError::Timeout {
            duration: std::time::Duration::from_secs(120),
        };
        let permanent = ArchivistError::PermanentExtraction {
            message: "not json".into(),
        };
        let corrupted = ArchivistError::corrupted("bad schema");

        assert!(transient.is_transient());
        assert!(timeout.is_transient());
        assert!(ArchivistError::storage("disk full").is_transient());
        assert!(!permanent.is_transient());
        assert!(!corrupted.is_transient());
    }

    #[test]
    fn corrupted_state_mentions_reset() {
        let err = ArchivistError::corrupted("schema version 7");
        let text = err.to_string();
        assert!(text.contains("schema version 7"));
        assert!(text.contains("reset-state"));
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Source,
            AdapterType::Extractor,
            AdapterType::FactStore,
            AdapterType::CheckpointMedium,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_source<T: MessageSource>() {}
        fn _assert_extractor<T: FactExtractor>() {}
        fn _assert_store<T: FactStore>() {}
        fn _assert_medium<T: CheckpointMedium>() {}
    }
}
