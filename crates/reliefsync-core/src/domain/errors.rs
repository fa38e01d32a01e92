//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation, coordinate checks, and malformed
//! change snapshots.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Identifier outside its valid range
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    /// Latitude or longitude outside of the valid range
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    /// Bounding box with inverted or degenerate edges
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Unknown work type status literal
    #[error("Unknown work type status: {0}")]
    UnknownStatus(String),

    /// A stored change snapshot could not be interpreted
    #[error("Invalid change snapshot: {0}")]
    InvalidSnapshot(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
