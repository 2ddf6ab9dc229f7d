//! Connection catalog for Warden.
//!
//! The catalog is a single JSON (or YAML) document listing the databases an
//! agent may query, the safety limits that apply to them, and the per
//! connection sensitivity policy.
//!
//! # Layout
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "safetyPolicy": { "readOnly": "yes", "maxRowReturned": 200 },
//!   "databases": [
//!     {
//!       "type": "postgres",
//!       "connectionName": "finance",
//!       "host": "db.internal", "port": 5432,
//!       "username": "agent", "database": "finance",
//!       "columnPolicy": { "pseudonymize": { "deterministic": ["users.fiscal_code"] } },
//!       "safeFunctions": ["billing.calc_balance"]
//!     }
//!   ]
//! }
//! ```
//!
//! Unknown keys are rejected at every level.

pub mod database;
pub mod safety;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::policy::PolicyEntryError;

pub use database::{
    ConnectionProfile, DatabaseColumnPolicy, DatabaseConfig, DatabaseKind, PseudonymizeColumns,
};
pub use safety::{
    ColumnPolicyMode, ColumnPolicySettings, PseudonymizeStrategy, ReadOnlyMode, SafetyPolicy,
    SafetyPolicyConfig, SENSITIVE_MAX_ROWS,
};

/// Largest catalog file accepted.
pub const MAX_CONFIG_BYTES: u64 = 8 * 1024 * 1024;

/// Largest number of database entries accepted.
pub const MAX_CONNECTIONS: usize = 50;

/// Catalog format versions this build understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Error type for catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration file is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("unsupported configuration version '{0}'")]
    UnsupportedVersion(String),

    #[error("\"databases\" must list at least one connection")]
    NoDatabases,

    #[error("too many databases: {count} (max {max})")]
    TooManyDatabases { count: usize, max: usize },

    #[error("connectionName must not be empty")]
    EmptyConnectionName,

    #[error("duplicate connectionName '{0}'")]
    DuplicateConnection(String),

    #[error("maxPayloadKiloBytes {0} does not fit in a 32-bit byte count")]
    PayloadOverflow(u32),

    #[error("connection '{connection}': {source}")]
    Policy {
        connection: String,
        #[source]
        source: PolicyEntryError,
    },
}

/// The catalog document exactly as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CatalogFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub safety_policy: SafetyPolicyConfig,

    pub databases: Vec<DatabaseConfig>,
}

/// Validated set of connection profiles.
#[derive(Debug, Clone)]
pub struct Catalog {
    policy: SafetyPolicy,
    profiles: Vec<ConnectionProfile>,
}

impl Catalog {
    /// Load a catalog file. Files ending in `.yaml` or `.yml` are parsed as
    /// YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let size = fs::metadata(path)?.len();
        if size > MAX_CONFIG_BYTES {
            return Err(ConfigError::TooLarge {
                size,
                max: MAX_CONFIG_BYTES,
            });
        }

        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let catalog = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };

        tracing::info!(
            path = %path.display(),
            connections = catalog.len(),
            "loaded connection catalog"
        );
        Ok(catalog)
    }

    /// Parse a catalog from JSON content.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::from_file_config(file)
    }

    /// Parse a catalog from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        Self::from_file_config(file)
    }

    /// Validate a parsed document and build every profile.
    pub fn from_file_config(file: CatalogFile) -> Result<Self, ConfigError> {
        if let Some(version) = &file.version {
            if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
                return Err(ConfigError::UnsupportedVersion(version.clone()));
            }
        }
        if file.databases.is_empty() {
            return Err(ConfigError::NoDatabases);
        }
        if file.databases.len() > MAX_CONNECTIONS {
            return Err(ConfigError::TooManyDatabases {
                count: file.databases.len(),
                max: MAX_CONNECTIONS,
            });
        }

        let policy = SafetyPolicy::resolve(&file.safety_policy)?;

        let mut profiles: Vec<ConnectionProfile> = Vec::with_capacity(file.databases.len());
        for db in &file.databases {
            let profile = ConnectionProfile::from_config(db, &file.safety_policy)?;
            if profiles
                .iter()
                .any(|p| p.connection_name.eq_ignore_ascii_case(&profile.connection_name))
            {
                return Err(ConfigError::DuplicateConnection(profile.connection_name));
            }
            profiles.push(profile);
        }

        Ok(Self { policy, profiles })
    }

    /// The global safety policy, before per-database overrides.
    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    /// Look up a profile by connection name, ignoring ASCII case.
    pub fn get(&self, connection_name: &str) -> Option<&ConnectionProfile> {
        self.profiles
            .iter()
            .find(|p| p.connection_name.eq_ignore_ascii_case(connection_name))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
