//! ReliefSync Conflict - Conflict detection for remote data
//!
//! Provides:
//! - Timestamp-based optimistic concurrency checks for worksite upserts
//! - The team skip rule
//!
//! Conflicts are never errors: a record that loses is skipped and counted.

pub mod detector;

pub use detector::{ConflictDetector, UpdateDecision};
