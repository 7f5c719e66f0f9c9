//! # portgate_core
//!
//! Core domain logic for Portgate: the credential store, portal sessions,
//! the access token broker, the gateway session layer, and the
//! permission/liveness filter.

pub mod apps;
pub mod auth;
pub mod clock;
pub mod db;
pub mod gateway;
pub mod liveness;
pub mod migrate;
pub mod models;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
