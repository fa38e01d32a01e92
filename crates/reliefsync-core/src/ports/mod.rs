//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteDataSource`] - Read access to the relief-coordination server
//! - [`IWorksiteRepository`] - Local store for worksites, sync stats and teams
//! - [`IWorksiteChangeRepository`] - Local edits and the change log
//! - [`ILocationProvider`] - Device location for spatial-bounded sync

pub mod change_repository;
pub mod location;
pub mod remote_data_source;
pub mod worksite_repository;

pub use change_repository::IWorksiteChangeRepository;
pub use location::{FixedLocation, ILocationProvider};
pub use remote_data_source::{
    IRemoteDataSource, NetworkFlag, NetworkFlagsFormData, NetworkFormData, NetworkNote,
    NetworkTeam, NetworkWorkType, NetworkWorksite, RecordShape, RemoteError,
};
pub use worksite_repository::{CommitOutcome, IWorksiteRepository};
