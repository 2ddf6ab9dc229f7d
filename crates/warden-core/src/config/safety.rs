//! Safety policy: execution limits applied to every connection.
//!
//! The policy is declared once at the top level of the catalog and may be
//! overridden field by field in each database entry.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Maximum rows a sensitive-mode query may request.
pub const SENSITIVE_MAX_ROWS: u32 = 200;

/// `readOnly` setting, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReadOnlyMode {
    /// `"yes"`: statements run in a read-only transaction.
    Yes,
    /// `"no unsafe"`: read-only transactions are not enforced.
    NoUnsafe,
}

impl TryFrom<String> for ReadOnlyMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("yes") {
            Ok(ReadOnlyMode::Yes)
        } else if value.eq_ignore_ascii_case("no unsafe") {
            Ok(ReadOnlyMode::NoUnsafe)
        } else {
            Err(format!(
                "invalid readOnly value '{}', expected \"yes\" or \"no unsafe\"",
                value
            ))
        }
    }
}

impl From<ReadOnlyMode> for String {
    fn from(mode: ReadOnlyMode) -> Self {
        match mode {
            ReadOnlyMode::Yes => "yes".to_string(),
            ReadOnlyMode::NoUnsafe => "no unsafe".to_string(),
        }
    }
}

/// How sensitive values leave the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPolicyMode {
    #[default]
    Pseudonymize,
}

/// Token strategy for pseudonymized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudonymizeStrategy {
    /// Same value, same token for the lifetime of the vault.
    Deterministic,
    /// A fresh token for every occurrence.
    #[default]
    Randomized,
}

/// `safetyPolicy.columnPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnPolicySettings {
    #[serde(default)]
    pub mode: ColumnPolicyMode,
    #[serde(default)]
    pub strategy: PseudonymizeStrategy,
}

/// `safetyPolicy` as written in the catalog. Every field is optional so the
/// same shape serves both the global policy and per-database overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SafetyPolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<ReadOnlyMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_ms: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_row_returned: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload_kilo_bytes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_policy: Option<ColumnPolicySettings>,
}

impl SafetyPolicyConfig {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(&self, other: &SafetyPolicyConfig) -> SafetyPolicyConfig {
        SafetyPolicyConfig {
            read_only: other.read_only.or(self.read_only),
            statement_timeout_ms: other.statement_timeout_ms.or(self.statement_timeout_ms),
            max_row_returned: other.max_row_returned.or(self.max_row_returned),
            max_payload_kilo_bytes: other.max_payload_kilo_bytes.or(self.max_payload_kilo_bytes),
            column_policy: other.column_policy.or(self.column_policy),
        }
    }
}

/// Effective limits for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyPolicy {
    pub read_only: bool,
    pub statement_timeout_ms: u32,
    pub max_rows: u32,
    pub max_payload_bytes: u32,
    pub column_policy: ColumnPolicySettings,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            read_only: true,
            statement_timeout_ms: default_statement_timeout_ms(),
            max_rows: default_max_rows(),
            max_payload_bytes: default_max_payload_kilobytes() * 1024,
            column_policy: ColumnPolicySettings::default(),
        }
    }
}

impl SafetyPolicy {
    /// Resolve a declared policy, filling unset fields with defaults.
    pub fn resolve(config: &SafetyPolicyConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_payload_bytes = match config.max_payload_kilo_bytes {
            Some(kb) => kb
                .checked_mul(1024)
                .ok_or(ConfigError::PayloadOverflow(kb))?,
            None => defaults.max_payload_bytes,
        };

        Ok(Self {
            read_only: config
                .read_only
                .map(|m| m == ReadOnlyMode::Yes)
                .unwrap_or(defaults.read_only),
            statement_timeout_ms: config
                .statement_timeout_ms
                .unwrap_or(defaults.statement_timeout_ms),
            max_rows: config.max_row_returned.unwrap_or(defaults.max_rows),
            max_payload_bytes,
            column_policy: config.column_policy.unwrap_or(defaults.column_policy),
        })
    }
}

fn default_statement_timeout_ms() -> u32 {
    5000
}

fn default_max_rows() -> u32 {
    SENSITIVE_MAX_ROWS
}

fn default_max_payload_kilobytes() -> u32 {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = SafetyPolicy::resolve(&SafetyPolicyConfig::default()).unwrap();
        assert!(policy.read_only);
        assert_eq!(policy.max_rows, 200);
        assert_eq!(policy.max_payload_bytes, 65536);
        assert_eq!(policy.statement_timeout_ms, 5000);
        assert_eq!(policy.column_policy.mode, ColumnPolicyMode::Pseudonymize);
        assert_eq!(policy.column_policy.strategy, PseudonymizeStrategy::Randomized);
    }

    #[test]
    fn test_read_only_is_case_insensitive() {
        let cfg: SafetyPolicyConfig = serde_json::from_str(r#"{"readOnly": "No Unsafe"}"#).unwrap();
        assert_eq!(cfg.read_only, Some(ReadOnlyMode::NoUnsafe));

        let cfg: SafetyPolicyConfig = serde_json::from_str(r#"{"readOnly": "YES"}"#).unwrap();
        assert_eq!(cfg.read_only, Some(ReadOnlyMode::Yes));

        assert!(serde_json::from_str::<SafetyPolicyConfig>(r#"{"readOnly": "maybe"}"#).is_err());
    }

    #[test]
    fn test_payload_kilobytes() {
        let cfg = SafetyPolicyConfig {
            max_payload_kilo_bytes: Some(1),
            ..Default::default()
        };
        assert_eq!(SafetyPolicy::resolve(&cfg).unwrap().max_payload_bytes, 1024);

        let cfg = SafetyPolicyConfig {
            max_payload_kilo_bytes: Some(u32::MAX),
            ..Default::default()
        };
        assert!(matches!(
            SafetyPolicy::resolve(&cfg),
            Err(ConfigError::PayloadOverflow(u32::MAX))
        ));
    }

    #[test]
    fn test_unknown_and_legacy_keys_rejected() {
        let err = serde_json::from_str::<SafetyPolicyConfig>(r#"{"maxQueryKiloBytes": 10}"#)
            .unwrap_err();
        assert!(err.to_string().contains("maxQueryKiloBytes"));

        let err = serde_json::from_str::<SafetyPolicyConfig>(
            r#"{"columnPolicy": {"mode": "pseudonymize", "strategy": "randomizedd"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("randomizedd"));
    }

    #[test]
    fn test_override_merge() {
        let global = SafetyPolicyConfig {
            read_only: Some(ReadOnlyMode::Yes),
            max_row_returned: Some(50),
            ..Default::default()
        };
        let local = SafetyPolicyConfig {
            read_only: Some(ReadOnlyMode::NoUnsafe),
            ..Default::default()
        };
        let merged = SafetyPolicy::resolve(&global.merged_with(&local)).unwrap();
        assert!(!merged.read_only);
        assert_eq!(merged.max_rows, 50);
    }
}
