//! Output plan returned for an accepted query.

use serde::Serialize;
use warden_core::config::PseudonymizeStrategy;

/// How one output column must be handled when rows come back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputColumn {
    /// Return values as they are.
    Plaintext,
    /// Replace values with vault tokens.
    Token {
        /// Canonical `schema.table.column`, or `table.column` when the
        /// relation was not schema-qualified.
        column_id: String,
        strategy: PseudonymizeStrategy,
    },
}

impl OutputColumn {
    pub fn is_token(&self) -> bool {
        matches!(self, OutputColumn::Token { .. })
    }

    pub fn column_id(&self) -> Option<&str> {
        match self {
            OutputColumn::Token { column_id, .. } => Some(column_id),
            OutputColumn::Plaintext => None,
        }
    }
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationPlan {
    /// Whether the query touched sensitive data.
    pub sensitive_mode: bool,
    /// One entry per top-level SELECT item, in order.
    pub columns: Vec<OutputColumn>,
}

impl ValidationPlan {
    pub fn token_count(&self) -> usize {
        self.columns.iter().filter(|c| c.is_token()).count()
    }
}
