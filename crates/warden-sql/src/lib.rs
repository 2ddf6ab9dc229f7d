//! # warden-sql
//!
//! PostgreSQL front end for Warden.
//!
//! [`PostgresBackend`] parses SQL text with sqlparser's PostgreSQL dialect,
//! lowers the single `SELECT` statement into the [`warden_core::ir`] model, and
//! provides the builtin function allowlist used by the validator.

mod builtins;
mod parser;

pub use builtins::POSTGRES_SAFE_FUNCTIONS;

use sqlparser::dialect::PostgreSqlDialect;
use warden_core::ir::Query;
use warden_core::{FunctionSafety, QueryProducer};

/// PostgreSQL implementation of the backend capabilities.
pub struct PostgresBackend {
    dialect: PostgreSqlDialect,
}

impl Clone for PostgresBackend {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Default for PostgresBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend").finish_non_exhaustive()
    }
}

impl PostgresBackend {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }
}

impl QueryProducer for PostgresBackend {
    fn make_query_ir(&self, sql: &str) -> Query {
        parser::lower_sql(&self.dialect, sql)
    }
}

impl FunctionSafety for PostgresBackend {
    fn is_function_safe(&self, schema: &str, name: &str) -> bool {
        POSTGRES_SAFE_FUNCTIONS.is_function_safe(schema, name)
    }
}
