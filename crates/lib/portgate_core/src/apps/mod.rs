//! Application registry and visibility.
//!
//! Applications are keyed by port. Permissions map an application to group
//! names; the reserved [`PUBLIC_GROUP`] opens it to every active user.

pub mod filter;
pub mod queries;

/// Reserved permission group meaning "every authenticated user".
pub const PUBLIC_GROUP: &str = "__public__";
