//! `warden validate` command implementation.
//!
//! Runs one statement through the validator for a catalog connection and
//! prints the verdict as JSON on stdout.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use std::process::ExitCode;

use warden_core::{Catalog, ConnectionProfile};
use warden_policy::{QueryValidator, StaticVault, ValidationError, ValidationPlan};
use warden_sql::PostgresBackend;

/// Vault state to validate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VaultMode {
    Open,
    Closed,
}

impl VaultMode {
    fn vault(self) -> StaticVault {
        match self {
            VaultMode::Open => StaticVault::OPEN,
            VaultMode::Closed => StaticVault::CLOSED,
        }
    }
}

pub fn run(config_path: &Path, connection: &str, vault: VaultMode, sql: &str) -> Result<ExitCode> {
    let catalog = Catalog::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let profile = catalog
        .get(connection)
        .with_context(|| format!("Unknown connection '{}'", connection))?;

    let result = validate(profile, vault, sql);
    println!("{}", serde_json::to_string_pretty(&verdict(&result))?);

    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Validate `sql` on `profile` with the PostgreSQL backend.
pub fn validate(
    profile: &ConnectionProfile,
    vault: VaultMode,
    sql: &str,
) -> Result<ValidationPlan, ValidationError> {
    let backend = PostgresBackend::new();
    let vault = vault.vault();
    let result = QueryValidator::new(profile, &backend, &backend)
        .with_vault(&vault)
        .validate(sql);

    match &result {
        Ok(plan) => tracing::info!(
            connection = %profile.connection_name,
            sensitive_mode = plan.sensitive_mode,
            "query accepted"
        ),
        Err(err) if err.kind.is_internal() => tracing::warn!(
            connection = %profile.connection_name,
            kind = %err.kind,
            reason = %err.message,
            "query could not be analyzed"
        ),
        Err(err) => tracing::info!(
            connection = %profile.connection_name,
            kind = %err.kind,
            "query rejected"
        ),
    }
    result
}

/// Message shown instead of the details of an analysis failure, which
/// only appear in the logs.
const ANALYSIS_FAILED: &str = "The query could not be analyzed.";

/// JSON verdict for a validation result.
pub fn verdict(result: &Result<ValidationPlan, ValidationError>) -> JsonValue {
    match result {
        Ok(plan) => json!({
            "ok": true,
            "sensitive_mode": plan.sensitive_mode,
            "columns": plan.columns,
        }),
        Err(err) => {
            let message = if err.kind.is_internal() {
                ANALYSIS_FAILED
            } else {
                err.message.as_str()
            };
            json!({
                "ok": false,
                "code": err.kind,
                "category": err.kind.category(),
                "message": message,
            })
        }
    }
}
