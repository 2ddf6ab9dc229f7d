//! Database entries and the connection profiles built from them.

use serde::{Deserialize, Serialize};

use super::safety::{PseudonymizeStrategy, SafetyPolicy, SafetyPolicyConfig};
use super::ConfigError;
use crate::policy::{ColumnPolicy, SafeFunctionPolicy};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Sensitive columns grouped by pseudonymization strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PseudonymizeColumns {
    #[serde(default)]
    pub deterministic: Vec<String>,
    #[serde(default)]
    pub randomized: Vec<String>,
}

/// `databases[].columnPolicy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseColumnPolicy {
    #[serde(default)]
    pub pseudonymize: PseudonymizeColumns,
}

/// One entry of `databases` as written in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub kind: DatabaseKind,

    pub connection_name: String,

    pub host: String,

    pub port: u16,

    pub username: String,

    pub database: String,

    /// Extra libpq-style connection options, e.g. `sslmode=disable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,

    /// Per-database overrides of the global safety policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_policy: Option<SafetyPolicyConfig>,

    #[serde(default)]
    pub column_policy: DatabaseColumnPolicy,

    /// Functions allowed on top of the backend's builtin list.
    #[serde(default)]
    pub safe_functions: Vec<String>,
}

/// A fully validated connection: where to connect, which limits apply and
/// which columns and functions are special.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub connection_name: String,
    pub kind: DatabaseKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub database: String,
    pub options: Option<String>,
    pub safety: SafetyPolicy,
    /// Every sensitive column regardless of strategy.
    pub sensitive_columns: ColumnPolicy,
    /// The subset declared under `deterministic`.
    pub deterministic_columns: ColumnPolicy,
    pub safe_functions: SafeFunctionPolicy,
}

impl ConnectionProfile {
    /// Build a profile from its catalog entry and the global policy.
    pub fn from_config(
        config: &DatabaseConfig,
        global_policy: &SafetyPolicyConfig,
    ) -> Result<Self, ConfigError> {
        let name = config.connection_name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyConnectionName);
        }

        let policy_config = match &config.safety_policy {
            Some(local) => global_policy.merged_with(local),
            None => global_policy.clone(),
        };
        let safety = SafetyPolicy::resolve(&policy_config)?;

        let policy_err = |source| ConfigError::Policy {
            connection: name.to_string(),
            source,
        };
        let lists = &config.column_policy.pseudonymize;
        let sensitive_columns = ColumnPolicy::build(
            lists.deterministic.iter().chain(lists.randomized.iter()),
        )
        .map_err(policy_err)?;
        let deterministic_columns =
            ColumnPolicy::build(lists.deterministic.iter()).map_err(policy_err)?;
        let safe_functions =
            SafeFunctionPolicy::build(config.safe_functions.iter()).map_err(policy_err)?;

        tracing::debug!(
            connection = %name,
            sensitive_columns = sensitive_columns.len(),
            safe_functions = safe_functions.len(),
            "built connection profile"
        );

        Ok(Self {
            connection_name: name.to_string(),
            kind: config.kind,
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            database: config.database.clone(),
            options: config.options.clone(),
            safety,
            sensitive_columns,
            deterministic_columns,
            safe_functions,
        })
    }

    pub fn is_column_sensitive(&self, schema: &str, table: &str, column: &str) -> bool {
        self.sensitive_columns.is_column_sensitive(schema, table, column)
    }

    pub fn is_function_safe(&self, schema: &str, name: &str) -> bool {
        self.safe_functions.is_function_safe(schema, name)
    }

    /// Strategy used to tokenize a sensitive column's values.
    pub fn column_strategy(&self, schema: &str, table: &str, column: &str) -> PseudonymizeStrategy {
        if self.deterministic_columns.is_column_sensitive(schema, table, column) {
            PseudonymizeStrategy::Deterministic
        } else if self.sensitive_columns.is_column_sensitive(schema, table, column) {
            PseudonymizeStrategy::Randomized
        } else {
            self.safety.column_policy.strategy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: &str) -> DatabaseConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_profile_from_entry() {
        let cfg = entry(
            r#"{
                "type": "postgres",
                "connectionName": "Finance",
                "host": "db.example",
                "port": 5432,
                "username": "alice",
                "database": "mydb",
                "columnPolicy": {
                    "pseudonymize": {
                        "deterministic": ["users.fiscal_code"],
                        "randomized": ["private.cards.balance"]
                    }
                },
                "safeFunctions": ["transfer_amount"]
            }"#,
        );
        let profile = ConnectionProfile::from_config(&cfg, &SafetyPolicyConfig::default()).unwrap();

        assert_eq!(profile.connection_name, "Finance");
        assert!(profile.is_column_sensitive("", "users", "fiscal_code"));
        assert!(profile.is_column_sensitive("private", "cards", "balance"));
        assert!(!profile.is_column_sensitive("public", "cards", "balance"));
        assert!(profile.is_function_safe("", "transfer_amount"));
        assert_eq!(
            profile.column_strategy("public", "users", "fiscal_code"),
            PseudonymizeStrategy::Deterministic
        );
        assert_eq!(
            profile.column_strategy("private", "cards", "balance"),
            PseudonymizeStrategy::Randomized
        );
    }

    #[test]
    fn test_port_out_of_range() {
        let err = serde_json::from_str::<DatabaseConfig>(
            r#"{"type": "postgres", "connectionName": "a", "host": "h",
                "port": 70000, "username": "u", "database": "d"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn test_only_postgres_supported() {
        assert!(serde_json::from_str::<DatabaseConfig>(
            r#"{"type": "mysql", "connectionName": "a", "host": "h",
                "port": 3306, "username": "u", "database": "d"}"#,
        )
        .is_err());
    }

    #[test]
    fn test_malformed_policy_names_connection() {
        let cfg = entry(
            r#"{"type": "postgres", "connectionName": "pg", "host": "h",
                "port": 5432, "username": "u", "database": "d",
                "safeFunctions": ["a.b.c"]}"#,
        );
        let err = ConnectionProfile::from_config(&cfg, &SafetyPolicyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("pg"));
        assert!(err.to_string().contains("a.b.c"));
    }
}
