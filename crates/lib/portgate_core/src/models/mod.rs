//! Domain models.
//!
//! Explicit records for users, applications and the session/token views
//! handed between the store and the HTTP layer.

pub mod apps;
pub mod auth;
