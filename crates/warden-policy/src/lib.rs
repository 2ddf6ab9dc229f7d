//! # warden-policy
//!
//! Decides whether a SQL statement may run against a connection.
//!
//! Column references are classified by [`touch::extract_touches`]; any
//! reference to a sensitive column switches the query into *sensitive mode*,
//! which requires an open [`vault`] and imposes the restrictions enforced by
//! the [`QueryValidator`]. Accepted queries yield a [`ValidationPlan`] naming
//! the output columns that must be tokenized.
//!
//! ```ignore
//! use warden_policy::{QueryValidator, StaticVault};
//!
//! let validator = QueryValidator::new(&profile, &backend, &backend)
//!     .with_vault(&StaticVault::OPEN);
//! let plan = validator.validate("SELECT u.name FROM users u WHERE u.id = 1")?;
//! ```

pub mod error;
pub mod plan;
pub mod touch;
pub mod validator;
pub mod vault;

pub use error::{ErrorCategory, ValidationError, ValidationErrorKind};
pub use plan::{OutputColumn, ValidationPlan};
pub use touch::{extract_touches, Scope, Touch, TouchKind, TouchReport};
pub use validator::QueryValidator;
pub use vault::{StaticVault, Vault, VaultAccess, VaultError, VaultState};
