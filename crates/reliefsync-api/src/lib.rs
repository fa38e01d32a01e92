//! ReliefSync API - relief-coordination server client
//!
//! Provides:
//! - An authenticated JSON client with 429 back-off
//! - [`HttpRemoteDataSource`], the HTTP implementation of the
//!   [`IRemoteDataSource`](reliefsync_core::ports::IRemoteDataSource) port
//!
//! ## Modules
//!
//! - [`client`] - Request construction and status → [`RemoteError`] mapping
//! - [`remote`] - Worksite, secondary data and team endpoints
//!
//! [`RemoteError`]: reliefsync_core::ports::RemoteError

pub mod client;
pub mod remote;

pub use client::ApiClient;
pub use remote::HttpRemoteDataSource;
