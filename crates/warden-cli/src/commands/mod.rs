//! CLI command implementations for Warden.

pub mod check;
pub mod validate;
