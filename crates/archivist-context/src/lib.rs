// SPDX-FileCopyrightText: 2026 Archivist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context window assembly for Archivist.
//!
//! A window around a target message is the union of:
//! - **Surrounding messages**: up to `half_window` neighbours on each side,
//!   clamped at the chat boundaries
//! - **Reply chain**: the target's `reply_to_id` ancestry, followed for at most
//!   `reply_depth` hops
//!
//! Windows are pure functions of the message sequence, so the pipeline can
//! build them ahead of the commit cursor.

pub mod window;

pub use window::{ContextWindowBuilder, WindowSpec};
