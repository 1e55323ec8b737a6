// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile memory for Archivist: merges extracted candidate facts into a
//! user's stored facts.
//!
//! Reconciliation is a pure function of the policy, the candidates, and the
//! stored facts. It never touches storage itself; the pipeline reads the
//! subject's facts, calls [`FactReconciler::reconcile`], and writes back
//! [`Reconciliation::writes`].

pub mod policy;
pub mod reconciler;
pub mod types;

pub use policy::{AttributeSchema, ReconcilePolicy};
pub use reconciler::{FactReconciler, new_keys};
pub use types::{
    CandidateOutcome, ConflictRecord, ConflictResolution, MergeOutcome, MergeReport,
    Reconciliation,
};
