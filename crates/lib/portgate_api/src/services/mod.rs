//! Services layer: flows composed from `portgate_core` calls.

pub mod cookies;
pub mod portal;
