//! Per-connection sensitivity tables.
//!
//! Both tables are built once while loading the connection catalog and are
//! immutable afterwards. Entries are lower-cased, sorted and deduplicated so
//! lookups are a single binary search.
//!
//! # Lookup rules
//!
//! | table | rule | caller schema empty | caller schema set |
//! |-------|------|---------------------|-------------------|
//! | columns | global | sensitive | sensitive |
//! | columns | schema-scoped | sensitive | sensitive if schema listed |
//! | functions | global | safe | safe |
//! | functions | schema-scoped | **unsafe** | safe if schema listed |
//!
//! The two tables fail in opposite directions when the schema
//! is unknown: a column is assumed sensitive, a function is assumed unsafe.

use std::cmp::Ordering;

/// Error raised for a malformed policy entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyEntryError {
    #[error("invalid sensitive column '{0}': expected 'table.column' or 'schema.table.column'")]
    Column(String),

    #[error("invalid safe function '{0}': expected 'name' or 'schema.name'")]
    Function(String),
}

/// One sensitive column, possibly restricted to a set of schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRule {
    pub table: String,
    pub column: String,
    /// Declared without schema: sensitive in every schema.
    pub is_global: bool,
    /// Sorted, unique schemas the column was declared under.
    pub schemas: Vec<String>,
}

/// One allowed function, possibly restricted to a set of schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeFunctionRule {
    pub name: String,
    pub is_global: bool,
    pub schemas: Vec<String>,
}

/// Sorted table of sensitive columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPolicy {
    rules: Box<[ColumnRule]>,
}

impl ColumnPolicy {
    /// Build the table from `table.column` / `schema.table.column` entries.
    pub fn build<I, S>(entries: I) -> Result<Self, PolicyEntryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            let lowered = entry.to_ascii_lowercase();
            let parts = split_parts(&lowered)
                .ok_or_else(|| PolicyEntryError::Column(entry.to_string()))?;
            let (schema, table, column) = match parts.as_slice() {
                [table, column] => (None, *table, *column),
                [schema, table, column] => (Some(*schema), *table, *column),
                _ => return Err(PolicyEntryError::Column(entry.to_string())),
            };
            rules.push(ColumnRule {
                table: table.to_string(),
                column: column.to_string(),
                is_global: schema.is_none(),
                schemas: schema.map(|s| vec![s.to_string()]).unwrap_or_default(),
            });
        }

        rules.sort_by(|a, b| (&a.table, &a.column).cmp(&(&b.table, &b.column)));
        let mut rules = merge_sorted(
            rules,
            |a, b| a.table == b.table && a.column == b.column,
            |dst, src| {
                dst.is_global |= src.is_global;
                dst.schemas.extend(src.schemas);
            },
        );
        for rule in &mut rules {
            normalize_schemas(&mut rule.schemas);
        }

        tracing::debug!(rules = rules.len(), "built column policy");
        Ok(Self {
            rules: rules.into_boxed_slice(),
        })
    }

    pub fn rules(&self) -> &[ColumnRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the rule for `table.column`.
    pub fn find(&self, table: &str, column: &str) -> Option<&ColumnRule> {
        self.rules
            .binary_search_by(|r| match r.table.as_str().cmp(table) {
                Ordering::Equal => r.column.as_str().cmp(column),
                other => other,
            })
            .ok()
            .map(|i| &self.rules[i])
    }

    /// Whether `schema.table.column` is sensitive. An empty schema matches
    /// any rule for the column.
    pub fn is_column_sensitive(&self, schema: &str, table: &str, column: &str) -> bool {
        let Some(rule) = self.find(table, column) else {
            return false;
        };
        if rule.is_global || schema.is_empty() {
            return true;
        }
        rule.schemas.binary_search_by(|s| s.as_str().cmp(schema)).is_ok()
    }
}

/// Sorted table of connection-specific safe functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeFunctionPolicy {
    rules: Box<[SafeFunctionRule]>,
}

impl SafeFunctionPolicy {
    /// Build the table from `name` / `schema.name` entries.
    pub fn build<I, S>(entries: I) -> Result<Self, PolicyEntryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            let lowered = entry.to_ascii_lowercase();
            let parts = split_parts(&lowered)
                .ok_or_else(|| PolicyEntryError::Function(entry.to_string()))?;
            let (schema, name) = match parts.as_slice() {
                [name] => (None, *name),
                [schema, name] => (Some(*schema), *name),
                _ => return Err(PolicyEntryError::Function(entry.to_string())),
            };
            rules.push(SafeFunctionRule {
                name: name.to_string(),
                is_global: schema.is_none(),
                schemas: schema.map(|s| vec![s.to_string()]).unwrap_or_default(),
            });
        }

        rules.sort_by(|a, b| a.name.cmp(&b.name));
        let mut rules = merge_sorted(rules, |a, b| a.name == b.name, |dst, src| {
            dst.is_global |= src.is_global;
            dst.schemas.extend(src.schemas);
        });
        for rule in &mut rules {
            normalize_schemas(&mut rule.schemas);
        }

        tracing::debug!(rules = rules.len(), "built safe function policy");
        Ok(Self {
            rules: rules.into_boxed_slice(),
        })
    }

    pub fn rules(&self) -> &[SafeFunctionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&SafeFunctionRule> {
        self.rules
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.rules[i])
    }

    /// Whether `schema.name` may be called. An unqualified call only matches
    /// a global rule.
    pub fn is_function_safe(&self, schema: &str, name: &str) -> bool {
        let Some(rule) = self.find(name) else {
            return false;
        };
        if rule.is_global {
            return true;
        }
        if schema.is_empty() {
            return false;
        }
        rule.schemas.binary_search_by(|s| s.as_str().cmp(schema)).is_ok()
    }
}

/// Split a dotted entry, rejecting empty segments.
fn split_parts(entry: &str) -> Option<Vec<&str>> {
    let parts: Vec<&str> = entry.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(parts)
}

/// Collapse adjacent equal rules of an already sorted vector.
fn merge_sorted<T>(
    sorted: Vec<T>,
    same_key: impl Fn(&T, &T) -> bool,
    merge: impl Fn(&mut T, T),
) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(sorted.len());
    for rule in sorted {
        match out.last_mut() {
            Some(last) if same_key(last, &rule) => merge(last, rule),
            _ => out.push(rule),
        }
    }
    out
}

fn normalize_schemas(schemas: &mut Vec<String>) {
    schemas.sort();
    schemas.dedup();
}
