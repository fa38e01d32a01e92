//! ReliefSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Worksite`, `WorkType`, `SyncStats`, `ChangeRecord`, `Team`
//! - **Use cases** - `CountUnsyncedClaimsUseCase`, `replay_changes`
//! - **Port definitions** - Traits for adapters: `IRemoteDataSource`,
//!   `IWorksiteRepository`, `IWorksiteChangeRepository`, `ILocationProvider`
//! - **Configuration** - YAML-backed settings for the pull pipeline
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
