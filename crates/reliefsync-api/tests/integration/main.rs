//! Integration tests for reliefsync-api
//!
//! Uses wiremock to simulate the relief-coordination server and verifies
//! request parameters, response decoding and error mapping of
//! HttpRemoteDataSource.

mod common;

mod test_errors;
mod test_teams;
mod test_worksites;
