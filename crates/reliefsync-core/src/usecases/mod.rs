//! Use cases (interactors) for ReliefSync
//!
//! This module contains the application use cases that orchestrate
//! domain entities and port interfaces. Use cases are thin coordinators
//! that delegate business rules to domain methods and I/O to ports.
//!
//! ## Use Cases
//!
//! - [`CountUnsyncedClaimsUseCase`] - Claims and closes pending upload
//! - [`replay_changes`] - Rebuild a worksite from its change log

pub mod count_unsynced_claims;
pub mod replay;

pub use count_unsynced_claims::{count_claims, ClaimCloseCounts, CountUnsyncedClaimsUseCase};
pub use replay::replay_changes;
