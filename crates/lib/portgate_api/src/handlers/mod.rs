//! Request handlers.

pub mod admin;
pub mod apps;
pub mod auth;
pub mod gateway;
pub mod health;
