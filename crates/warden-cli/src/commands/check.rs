//! `warden check` command implementation.
//!
//! Loads the connection catalog, which validates every entry, and prints a
//! summary of what each connection enforces:
//! - where it points
//! - its sensitive columns and extra safe functions
//! - the effective safety policy after per-database overrides

use anyhow::{Context, Result};
use std::path::Path;

use warden_core::config::{PseudonymizeStrategy, SafetyPolicy};
use warden_core::policy::{ColumnRule, SafeFunctionRule};
use warden_core::{Catalog, ConnectionProfile};

/// Load `config_path` and print the summary.
pub fn run(config_path: &Path) -> Result<()> {
    let catalog = Catalog::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    for line in render(&catalog) {
        println!("{}", line);
    }
    Ok(())
}

/// Summary lines for a loaded catalog.
pub fn render(catalog: &Catalog) -> Vec<String> {
    let mut lines = vec![
        format!("✅ Configuration OK: {} connection(s)", catalog.len()),
        format!("Global policy: {}", describe_policy(catalog.policy())),
    ];
    for profile in catalog.profiles() {
        lines.push(String::new());
        lines.extend(render_profile(profile));
    }
    lines
}

fn render_profile(profile: &ConnectionProfile) -> Vec<String> {
    let mut lines = vec![
        format!("• {} ({})", profile.connection_name, profile.kind),
        format!(
            "   Target: {}@{}:{}/{}",
            profile.username, profile.host, profile.port, profile.database
        ),
        format!("   Policy: {}", describe_policy(&profile.safety)),
    ];

    let sensitive = profile.sensitive_columns.rules();
    if sensitive.is_empty() {
        lines.push("   Sensitive columns: none".to_string());
    } else {
        lines.push(format!(
            "   Sensitive columns ({}, {} deterministic):",
            sensitive.len(),
            profile.deterministic_columns.len()
        ));
        for rule in sensitive {
            lines.push(format!("     - {}", describe_column(rule)));
        }
    }

    let functions = profile.safe_functions.rules();
    if functions.is_empty() {
        lines.push("   Safe functions: builtins only".to_string());
    } else {
        lines.push(format!("   Safe functions ({} beyond builtins):", functions.len()));
        for rule in functions {
            lines.push(format!("     - {}", describe_function(rule)));
        }
    }
    lines
}

fn describe_policy(policy: &SafetyPolicy) -> String {
    format!(
        "read-only {}, timeout {} ms, max rows {}, max payload {} bytes, {} tokens",
        if policy.read_only { "yes" } else { "no" },
        policy.statement_timeout_ms,
        policy.max_rows,
        policy.max_payload_bytes,
        strategy_name(policy.column_policy.strategy)
    )
}

fn strategy_name(strategy: PseudonymizeStrategy) -> &'static str {
    match strategy {
        PseudonymizeStrategy::Deterministic => "deterministic",
        PseudonymizeStrategy::Randomized => "randomized",
    }
}

fn describe_column(rule: &ColumnRule) -> String {
    let name = format!("{}.{}", rule.table, rule.column);
    scoped(name, rule.is_global, &rule.schemas)
}

fn describe_function(rule: &SafeFunctionRule) -> String {
    scoped(rule.name.clone(), rule.is_global, &rule.schemas)
}

fn scoped(name: String, is_global: bool, schemas: &[String]) -> String {
    match (is_global, schemas.is_empty()) {
        (true, true) => format!("{} (any schema)", name),
        (true, false) => format!("{} (any schema; listed for {})", name, schemas.join(", ")),
        (false, _) => format!("{} (schemas: {})", name, schemas.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"{
        "safetyPolicy": {"maxRowReturned": 100},
        "databases": [{
            "type": "postgres",
            "connectionName": "finance",
            "host": "db.internal",
            "port": 5432,
            "username": "agent",
            "database": "ledger",
            "safetyPolicy": {"statementTimeoutMs": 250},
            "columnPolicy": {
                "pseudonymize": {
                    "deterministic": ["users.fiscal_code"],
                    "randomized": ["private.users.fiscal_code", "billing.cards.pan"]
                }
            },
            "safeFunctions": ["billing.calc_balance"]
        }]
    }"#;

    #[test]
    fn test_render_profile_summary() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let lines = render(&catalog);

        assert_eq!(lines[0], "✅ Configuration OK: 1 connection(s)");
        assert!(lines[1].contains("max rows 100"));
        assert!(lines.contains(&"• finance (postgres)".to_string()));
        assert!(lines.contains(&"   Target: agent@db.internal:5432/ledger".to_string()));
        assert!(lines.iter().any(|l| l.contains("timeout 250 ms")));
        assert!(lines.contains(&"   Sensitive columns (2, 1 deterministic):".to_string()));
        assert!(lines.contains(&"     - cards.pan (schemas: billing)".to_string()));
        assert!(lines.contains(
            &"     - users.fiscal_code (any schema; listed for private)".to_string()
        ));
        assert!(lines.contains(&"     - calc_balance (schemas: billing)".to_string()));
    }

    #[test]
    fn test_render_empty_policies() {
        let catalog = Catalog::from_json(
            r#"{"databases": [{"type": "postgres", "connectionName": "pg",
                "host": "h", "port": 5432, "username": "u", "database": "d"}]}"#,
        )
        .unwrap();
        let lines = render(&catalog);
        assert!(lines.contains(&"   Sensitive columns: none".to_string()));
        assert!(lines.contains(&"   Safe functions: builtins only".to_string()));
    }

    #[test]
    fn test_run_reports_load_errors() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"databases": []}"#).unwrap();

        let err = run(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to load configuration"));
        assert!(format!("{:#}", err).contains("at least one connection"));
    }

    #[test]
    fn test_run_accepts_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            b"databases:\n  - type: postgres\n    connectionName: pg\n    host: h\n    port: 5432\n    username: u\n    database: d\n",
        )
        .unwrap();
        run(file.path()).unwrap();
    }
}
