//! Validation error types for query enforcement.
//!
//! Every rejection carries a [`ValidationErrorKind`] from a closed set and a
//! human-readable message. Kinds are grouped by category so callers can
//! decide how much detail to surface.

use serde::Serialize;
use std::fmt;

/// Error type for validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The kind of validation error.
    pub kind: ValidationErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    // =========================================================================
    // ANALYSIS FAILURES
    // =========================================================================

    /// The producer could not parse the statement.
    pub fn parse_fail(reason: Option<&str>) -> Self {
        Self::new(
            ValidationErrorKind::ParseFail,
            reason.unwrap_or("Invalid query."),
        )
    }

    /// The producer or a later pass met a construct it cannot model.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::UnsupportedQuery, reason)
    }

    /// An unsupported expression was found while walking the tree.
    pub fn unsupported_expression() -> Self {
        Self::unsupported("Unsupported expression.")
    }

    /// Recursion went deeper than the nesting cap.
    pub fn too_deep() -> Self {
        Self::unsupported("Query nesting is too deep.")
    }

    /// A column qualifier could not be resolved against its block.
    pub fn analyze_fail() -> Self {
        Self::new(
            ValidationErrorKind::AnalyzeFail,
            "Unable to analyze columns. Every table must have an alias, and every column must be qualified as alias.column.",
        )
    }

    // =========================================================================
    // CAPABILITY ERRORS
    // =========================================================================

    /// Sensitive data was requested while the vault is closed.
    pub fn vault_closed() -> Self {
        Self::new(
            ValidationErrorKind::VaultClosed,
            "Sensitive columns require an open vault.",
        )
    }

    // =========================================================================
    // STRUCTURAL ERRORS
    // =========================================================================

    pub fn star() -> Self {
        Self::new(ValidationErrorKind::Star, "SELECT * is not allowed.")
    }

    pub fn missing_from_alias(item: &str) -> Self {
        Self::new(
            ValidationErrorKind::NoTableAlias,
            format!("Missing alias in FROM item: {}.", item),
        )
    }

    pub fn missing_join_alias(item: &str) -> Self {
        Self::new(
            ValidationErrorKind::NoTableAlias,
            format!("Missing alias in JOIN item: {}.", item),
        )
    }

    pub fn unknown_column(column: &str) -> Self {
        Self::new(
            ValidationErrorKind::NoColumnAlias,
            format!(
                "Unknown column reference '{}'. Every table must have an alias, and every column must be qualified as alias.column.",
                column
            ),
        )
    }

    pub fn where_not_conjunction() -> Self {
        Self::new(
            ValidationErrorKind::WhereNotConjunction,
            "WHERE must be a conjunction of AND predicates if a sensitive column is referenced.",
        )
    }

    pub fn join_not_inner() -> Self {
        Self::new(
            ValidationErrorKind::JoinNotInner,
            "Only INNER JOIN is allowed in sensitive mode.",
        )
    }

    pub fn join_operands_not_simple() -> Self {
        Self::new(
            ValidationErrorKind::JoinOnInvalid,
            "JOIN predicates must compare simple operands in sensitive mode.",
        )
    }

    pub fn join_on_not_equalities() -> Self {
        Self::new(
            ValidationErrorKind::JoinOnInvalid,
            "JOIN ON must be AND of '=' predicates.",
        )
    }

    // =========================================================================
    // SENSITIVITY ERRORS
    // =========================================================================

    pub fn sensitive_outside_main(column: &str) -> Self {
        Self::new(
            ValidationErrorKind::SensitiveOutsideMain,
            format!(
                "Column '{}' is sensitive, so it's only allowed in main query.",
                column
            ),
        )
    }

    pub fn sensitive_not_direct(column: &str, clause: &str) -> Self {
        Self::new(
            ValidationErrorKind::SensitiveLocation,
            format!(
                "Sensitive column '{}' must be referenced directly in {}.",
                column, clause
            ),
        )
    }

    pub fn sensitive_in_clause(clause: &str, column: &str) -> Self {
        Self::new(
            ValidationErrorKind::SensitiveLocation,
            format!("{} cannot reference sensitive column '{}'.", clause, column),
        )
    }

    pub fn sensitive_compare_non_param(column: &str) -> Self {
        Self::new(
            ValidationErrorKind::SensitiveComparison,
            format!(
                "Sensitive column '{}' must compare only to parameters.",
                column
            ),
        )
    }

    pub fn sensitive_in_list(column: &str) -> Self {
        Self::new(
            ValidationErrorKind::SensitiveComparison,
            format!("Sensitive column '{}' cannot appear in IN list.", column),
        )
    }

    pub fn unsupported_sensitive_predicate() -> Self {
        Self::new(
            ValidationErrorKind::SensitiveComparison,
            "Unsupported WHERE predicate in sensitive mode.",
        )
    }

    pub fn sensitive_select_expr() -> Self {
        Self::new(
            ValidationErrorKind::SensitiveSelectExpr,
            "Sensitive columns must be selected directly.",
        )
    }

    pub fn join_on_sensitive(left: &str, right: &str) -> Self {
        Self::new(
            ValidationErrorKind::JoinOnSensitive,
            format!(
                "JOIN predicate references sensitive column ('{}' or '{}'), which is not allowed.",
                left, right
            ),
        )
    }

    pub fn distinct_sensitive() -> Self {
        Self::new(
            ValidationErrorKind::DistinctSensitive,
            "DISTINCT is not allowed in sensitive mode.",
        )
    }

    pub fn offset_sensitive() -> Self {
        Self::new(
            ValidationErrorKind::OffsetSensitive,
            "OFFSET is not allowed in sensitive mode.",
        )
    }

    pub fn limit_required() -> Self {
        Self::new(
            ValidationErrorKind::LimitRequired,
            "LIMIT is required in sensitive mode.",
        )
    }

    pub fn limit_exceeds(limit: u32, max: u32) -> Self {
        Self::new(
            ValidationErrorKind::LimitExceeds,
            format!(
                "LIMIT {} exceeds the sensitive mode maximum of {}.",
                limit, max
            ),
        )
    }

    pub fn param_outside_where() -> Self {
        Self::new(
            ValidationErrorKind::ParamOutsideWhere,
            "Parameters are only allowed inside WHERE.",
        )
    }

    pub fn param_outside_comparison() -> Self {
        Self::new(
            ValidationErrorKind::ParamOutsideWhere,
            "Parameters are only allowed inside WHERE comparisons.",
        )
    }

    pub fn param_non_sensitive() -> Self {
        Self::new(
            ValidationErrorKind::ParamNonSensitive,
            "Parameters can only compare to sensitive columns.",
        )
    }

    pub fn param_in_list_non_sensitive() -> Self {
        Self::new(
            ValidationErrorKind::ParamNonSensitive,
            "Parameters inside IN() can only compare to sensitive columns.",
        )
    }

    // =========================================================================
    // FUNCTION ERRORS
    // =========================================================================

    pub fn function_unsafe(call: &str) -> Self {
        Self::new(
            ValidationErrorKind::FuncUnsafe,
            format!("Unsafe function call: {}.", call),
        )
    }

    pub fn function_name_invalid(call: &str) -> Self {
        Self::new(
            ValidationErrorKind::FuncUnsafe,
            format!("Invalid function name: {}.", call),
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Broad grouping of [`ValidationErrorKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Analysis,
    Capability,
    Structural,
    Sensitivity,
    Function,
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    // =========================================================================
    // Analysis failures
    // =========================================================================
    /// The statement could not be parsed.
    ParseFail,
    /// The statement uses a construct that cannot be analyzed safely.
    UnsupportedQuery,
    /// Column resolution failed during analysis.
    AnalyzeFail,

    // =========================================================================
    // Capability errors
    // =========================================================================
    /// Sensitive mode requires an open vault.
    VaultClosed,

    // =========================================================================
    // Structural errors
    // =========================================================================
    /// A FROM or JOIN item has no alias.
    NoTableAlias,
    /// A column is unqualified or its qualifier is unknown.
    NoColumnAlias,
    /// `SELECT *` or `alias.*`.
    Star,
    /// WHERE uses OR/NOT in sensitive mode.
    WhereNotConjunction,
    /// A non-inner join in sensitive mode.
    JoinNotInner,
    /// JOIN ON is not an AND of simple equalities.
    JoinOnInvalid,

    // =========================================================================
    // Sensitivity errors
    // =========================================================================
    SensitiveOutsideMain,
    SensitiveLocation,
    SensitiveComparison,
    SensitiveSelectExpr,
    JoinOnSensitive,
    DistinctSensitive,
    OffsetSensitive,
    LimitRequired,
    LimitExceeds,
    ParamOutsideWhere,
    ParamNonSensitive,

    // =========================================================================
    // Function errors
    // =========================================================================
    /// A function outside both allowlists.
    FuncUnsafe,
}

impl ValidationErrorKind {
    pub fn category(self) -> ErrorCategory {
        use ValidationErrorKind::*;
        match self {
            ParseFail | UnsupportedQuery | AnalyzeFail => ErrorCategory::Analysis,
            VaultClosed => ErrorCategory::Capability,
            NoTableAlias | NoColumnAlias | Star | WhereNotConjunction | JoinNotInner
            | JoinOnInvalid => ErrorCategory::Structural,
            SensitiveOutsideMain | SensitiveLocation | SensitiveComparison
            | SensitiveSelectExpr | JoinOnSensitive | DistinctSensitive | OffsetSensitive
            | LimitRequired | LimitExceeds | ParamOutsideWhere | ParamNonSensitive => {
                ErrorCategory::Sensitivity
            }
            FuncUnsafe => ErrorCategory::Function,
        }
    }

    /// Analysis failures describe the engine's limits rather than a policy
    /// violation; callers may replace their message with a generic one.
    pub fn is_internal(self) -> bool {
        self.category() == ErrorCategory::Analysis
    }

    /// Stable snake_case name, as used in serialized verdicts.
    pub fn as_str(self) -> &'static str {
        use ValidationErrorKind::*;
        match self {
            ParseFail => "parse_fail",
            UnsupportedQuery => "unsupported_query",
            AnalyzeFail => "analyze_fail",
            VaultClosed => "vault_closed",
            NoTableAlias => "no_table_alias",
            NoColumnAlias => "no_column_alias",
            Star => "star",
            WhereNotConjunction => "where_not_conjunction",
            JoinNotInner => "join_not_inner",
            JoinOnInvalid => "join_on_invalid",
            SensitiveOutsideMain => "sensitive_outside_main",
            SensitiveLocation => "sensitive_location",
            SensitiveComparison => "sensitive_comparison",
            SensitiveSelectExpr => "sensitive_select_expr",
            JoinOnSensitive => "join_on_sensitive",
            DistinctSensitive => "distinct_sensitive",
            OffsetSensitive => "offset_sensitive",
            LimitRequired => "limit_required",
            LimitExceeds => "limit_exceeds",
            ParamOutsideWhere => "param_outside_where",
            ParamNonSensitive => "param_non_sensitive",
            FuncUnsafe => "func_unsafe",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            ValidationErrorKind::ParseFail.category(),
            ErrorCategory::Analysis
        );
        assert!(ValidationErrorKind::AnalyzeFail.is_internal());
        assert!(!ValidationErrorKind::Star.is_internal());
        assert_eq!(
            ValidationErrorKind::ParamNonSensitive.category(),
            ErrorCategory::Sensitivity
        );
        assert_eq!(
            ValidationErrorKind::FuncUnsafe.category(),
            ErrorCategory::Function
        );
    }

    #[test]
    fn test_serialized_name_matches_as_str() {
        let kind = ValidationErrorKind::SensitiveOutsideMain;
        assert_eq!(
            serde_json::to_value(kind).unwrap(),
            serde_json::json!(kind.as_str())
        );
    }

    #[test]
    fn test_messages_are_never_empty() {
        assert_eq!(ValidationError::parse_fail(None).message, "Invalid query.");
        assert_eq!(
            ValidationError::function_unsafe("lower2(u.fiscal_code)").to_string(),
            "Unsafe function call: lower2(u.fiscal_code)."
        );
    }
}
