//! Query validator.
//!
//! The [`QueryValidator`] decides whether a statement may run on a
//! connection. It works in stages, stopping at the first violation:
//!
//! 1. **Build** the IR through the backend's [`QueryProducer`]
//! 2. **Classify** every column reference (see [`crate::touch`]) and decide
//!    whether the query runs in *sensitive mode*
//! 3. **Scope** checks: unknown references are rejected, sensitive columns
//!    may only appear in the main block
//! 4. **Pass A** on every block: no `*`, aliases everywhere, only allowed
//!    functions, parameters only in WHERE comparisons
//! 5. **Pass B** on every block, sensitive mode only: LIMIT, inner joins,
//!    AND-only WHERE, sensitive columns compared to parameters only
//!
//! An accepted query yields a [`ValidationPlan`] telling the caller which
//! output columns must be tokenized.

use warden_core::config::{ConnectionProfile, SENSITIVE_MAX_ROWS};
use warden_core::ir::{
    ColumnRef, CompareOp, Expr, FromKind, JoinKind, Query, QueryStatus, MAX_NESTING_DEPTH,
};
use warden_core::{FunctionSafety, QueryProducer};

use crate::error::ValidationError;
use crate::plan::{OutputColumn, ValidationPlan};
use crate::touch::{extract_touches, Scope, TouchKind, TouchReport};
use crate::vault::{StaticVault, VaultAccess};

/// Validates SQL statements for one connection profile.
///
/// The validator borrows everything it needs and holds no state between
/// calls, so one instance may be shared across threads.
pub struct QueryValidator<'a> {
    /// Sensitivity and function policy of the target connection.
    profile: &'a ConnectionProfile,
    /// Turns SQL text into IR.
    producer: &'a dyn QueryProducer,
    /// Backend builtin function allowlist.
    functions: &'a dyn FunctionSafety,
    /// Whether sensitive data may be requested right now.
    vault: &'a dyn VaultAccess,
}

impl<'a> QueryValidator<'a> {
    /// Create a validator. The vault starts out closed.
    pub fn new(
        profile: &'a ConnectionProfile,
        producer: &'a dyn QueryProducer,
        functions: &'a dyn FunctionSafety,
    ) -> Self {
        Self {
            profile,
            producer,
            functions,
            vault: &StaticVault::CLOSED,
        }
    }

    /// Use `vault` to decide whether sensitive mode is available.
    pub fn with_vault(mut self, vault: &'a dyn VaultAccess) -> Self {
        self.vault = vault;
        self
    }

    /// Validate a statement, returning its output plan.
    pub fn validate(&self, sql: &str) -> Result<ValidationPlan, ValidationError> {
        let query = self.producer.make_query_ir(sql);
        let result = self.validate_ir(&query);
        match &result {
            Ok(plan) => tracing::debug!(
                connection = %self.profile.connection_name,
                sensitive_mode = plan.sensitive_mode,
                tokens = plan.token_count(),
                "query accepted"
            ),
            Err(err) => tracing::debug!(
                connection = %self.profile.connection_name,
                kind = %err.kind,
                reason = %err.message,
                "query rejected"
            ),
        }
        result
    }

    /// Validate a statement, discarding the plan.
    pub fn validate_query(&self, sql: &str) -> Result<(), ValidationError> {
        self.validate(sql).map(|_| ())
    }

    /// Validate an already built query.
    ///
    /// Validation is performed in this order:
    /// 1. Producer status
    /// 2. Top-level `*`
    /// 3. Touch extraction and unsupported constructs
    /// 4. Sensitive mode detection
    /// 5. Vault check (sensitive mode only)
    /// 6. Touch scopes
    /// 7. Pass A on every block
    /// 8. Pass B on every block (sensitive mode only)
    pub fn validate_ir(&self, query: &Query) -> Result<ValidationPlan, ValidationError> {
        // 1. Producer status
        match query.status() {
            QueryStatus::Ok => {}
            QueryStatus::ParseError => {
                return Err(ValidationError::parse_fail(query.status_reason()));
            }
            QueryStatus::Unsupported => {
                return Err(ValidationError::unsupported(
                    query.status_reason().unwrap_or("Invalid query."),
                ));
            }
        }

        // 2. SELECT * at the top level; nested blocks are covered by Pass A
        if query.has_star {
            return Err(ValidationError::star());
        }

        // 3. Touches
        let report = extract_touches(query);
        if report.has_unsupported {
            return Err(ValidationError::unsupported("Unsupported query structure."));
        }

        // 4. Sensitive mode
        let sensitivity = self.touch_sensitivity(&report)?;
        let sensitive_mode =
            report.has_unknown_touches || sensitivity.iter().any(|&s| s);
        tracing::trace!(
            touches = report.touches.len(),
            sensitive_mode,
            "touches classified"
        );

        // 5. Vault
        if sensitive_mode && !self.vault.is_open() {
            return Err(ValidationError::vault_closed());
        }

        // 6. Scopes
        for (touch, &sensitive) in report.touches.iter().zip(&sensitivity) {
            if touch.kind == TouchKind::Unknown {
                return Err(ValidationError::unknown_column(&touch.column.to_string()));
            }
            if sensitive && touch.scope != Scope::Main {
                return Err(ValidationError::sensitive_outside_main(
                    &touch.column.to_string(),
                ));
            }
        }

        // 7. Pass A
        self.pass_a(query, 0)?;

        // 8. Pass B
        if sensitive_mode {
            self.pass_b(query, 0)?;
        }

        Ok(ValidationPlan {
            sensitive_mode,
            columns: self.output_columns(query)?,
        })
    }

    // =========================================================================
    // Column and function lookups
    // =========================================================================

    /// Sensitivity of each base touch, index-aligned with the report.
    /// Every base touch is resolved, so an unresolvable one always fails.
    fn touch_sensitivity(&self, report: &TouchReport<'_>) -> Result<Vec<bool>, ValidationError> {
        report
            .touches
            .iter()
            .map(|t| match t.kind {
                TouchKind::Base => self.is_column_sensitive(t.source, t.column),
                TouchKind::Derived | TouchKind::Unknown => Ok(false),
            })
            .collect()
    }

    /// Whether `col` reads a sensitive base column of `block`.
    ///
    /// Derived relations are not traced back to their base tables; sensitive
    /// columns never reach them because of the scope checks.
    fn is_column_sensitive(&self, block: &Query, col: &ColumnRef) -> Result<bool, ValidationError> {
        let from = block
            .find_alias(&col.qualifier)
            .ok_or_else(ValidationError::analyze_fail)?;
        match &from.kind {
            FromKind::BaseRel { schema, name } => {
                Ok(self.profile.is_column_sensitive(schema, name, &col.column))
            }
            _ => Ok(false),
        }
    }

    /// First sensitive column referenced by `e` in `block`. Subqueries are
    /// separate blocks and are not searched.
    fn find_sensitive<'e>(
        &self,
        block: &Query,
        e: &'e Expr,
        depth: usize,
    ) -> Result<Option<&'e ColumnRef>, ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        match e {
            Expr::Column(col) => Ok(self.is_column_sensitive(block, col)?.then_some(col)),
            Expr::Subquery(_) | Expr::Param(_) | Expr::Literal(_) => Ok(None),
            Expr::Unsupported => Err(ValidationError::unsupported_expression()),
            other => {
                for child in other.children() {
                    if let Some(col) = self.find_sensitive(block, child, depth + 1)? {
                        return Ok(Some(col));
                    }
                }
                Ok(None)
            }
        }
    }

    fn has_sensitive(&self, block: &Query, e: &Expr) -> Result<bool, ValidationError> {
        Ok(self.find_sensitive(block, e, 0)?.is_some())
    }

    fn is_function_safe(&self, schema: &str, name: &str) -> bool {
        self.functions.is_function_safe(schema, name)
            || self.profile.is_function_safe(schema, name)
    }

    // =========================================================================
    // Pass A: structure, functions and parameters
    // =========================================================================

    fn pass_a(&self, q: &Query, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }

        if q.has_star {
            return Err(ValidationError::star());
        }

        // Aliases are required at every depth, otherwise a nested block could
        // hide references the touch extractor cannot attribute.
        for fi in &q.from_items {
            if fi.alias.is_empty() {
                return Err(ValidationError::missing_from_alias(&fi.to_string()));
            }
        }
        for join in &q.joins {
            if join.rhs.alias.is_empty() {
                return Err(ValidationError::missing_join_alias(&join.rhs.to_string()));
            }
        }

        // SELECT
        for item in &q.select_items {
            self.check_outside_where(&item.value, depth)?;
        }
        // WHERE
        if let Some(w) = &q.where_clause {
            self.check_functions(w, depth)?;
            self.check_where_params(q, w, depth)?;
            self.pass_a_subqueries(w, depth)?;
        }
        // GROUP BY
        for e in &q.group_by {
            self.check_outside_where(e, depth)?;
        }
        // HAVING
        if let Some(h) = &q.having {
            self.check_outside_where(h, depth)?;
        }
        // ORDER BY
        for e in &q.order_by {
            self.check_outside_where(e, depth)?;
        }
        // JOIN ON
        for join in &q.joins {
            if let Some(on) = &join.on {
                self.check_outside_where(on, depth)?;
            }
        }

        for cte in &q.ctes {
            self.pass_a(&cte.query, depth + 1)?;
        }
        for fi in q.range_items() {
            if let FromKind::Subquery(sub) = &fi.kind {
                self.pass_a(sub, depth + 1)?;
            }
        }
        Ok(())
    }

    /// Pass A for a clause other than WHERE.
    fn check_outside_where(&self, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        self.check_functions(e, depth)?;
        if has_param(e) {
            return Err(ValidationError::param_outside_where());
        }
        self.pass_a_subqueries(e, depth)
    }

    /// Every function and window function in `e` must be allowlisted.
    fn check_functions(&self, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        let func = match e {
            Expr::Function(f) => Some(f),
            Expr::Window(w) => Some(&w.func),
            Expr::Unsupported => return Err(ValidationError::unsupported_expression()),
            _ => None,
        };
        if let Some(f) = func {
            if f.name.is_empty() {
                return Err(ValidationError::function_name_invalid(&f.to_string()));
            }
            if !self.is_function_safe(&f.schema, &f.name) {
                return Err(ValidationError::function_unsafe(&f.to_string()));
            }
        }
        for child in e.children() {
            self.check_functions(child, depth + 1)?;
        }
        Ok(())
    }

    /// Parameters inside WHERE may only be compared to sensitive columns.
    fn check_where_params(&self, q: &Query, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        match e {
            Expr::And(l, r) | Expr::Or(l, r) => {
                self.check_where_params(q, l, depth + 1)?;
                self.check_where_params(q, r, depth + 1)
            }
            Expr::Not(inner) => self.check_where_params(q, inner, depth + 1),
            Expr::Compare {
                op: CompareOp::Eq,
                left,
                right,
            } => {
                if (!left.is_param() && has_param(left))
                    || (!right.is_param() && has_param(right))
                {
                    return Err(ValidationError::param_outside_comparison());
                }
                if left.is_param() && !self.has_sensitive(q, right)? {
                    return Err(ValidationError::param_non_sensitive());
                }
                if right.is_param() && !self.has_sensitive(q, left)? {
                    return Err(ValidationError::param_non_sensitive());
                }
                Ok(())
            }
            // Pass B restricts these further in sensitive mode.
            Expr::Compare { .. } => Ok(()),
            Expr::In { lhs, items } => {
                let lhs_sensitive = self.has_sensitive(q, lhs)?;
                if !lhs_sensitive && items.iter().any(Expr::is_param) {
                    return Err(ValidationError::param_in_list_non_sensitive());
                }
                Ok(())
            }
            Expr::Param(_) => Err(ValidationError::param_outside_comparison()),
            Expr::Unsupported => Err(ValidationError::unsupported_expression()),
            other => {
                if has_param(other) {
                    return Err(ValidationError::param_outside_comparison());
                }
                Ok(())
            }
        }
    }

    /// Run Pass A on every subquery inside `e`.
    fn pass_a_subqueries(&self, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        self.for_each_subquery(e, depth, &|sub, d| self.pass_a(sub, d))
    }

    fn for_each_subquery(
        &self,
        e: &Expr,
        depth: usize,
        f: &dyn Fn(&Query, usize) -> Result<(), ValidationError>,
    ) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        match e {
            Expr::Subquery(sub) => f(sub, depth + 1),
            Expr::Unsupported => Err(ValidationError::unsupported_expression()),
            other => {
                for child in other.children() {
                    self.for_each_subquery(child, depth + 1, f)?;
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Pass B: sensitive mode
    // =========================================================================

    fn pass_b(&self, q: &Query, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }

        if q.has_star {
            return Err(ValidationError::star());
        }
        if q.has_distinct {
            return Err(ValidationError::distinct_sensitive());
        }
        if q.has_offset {
            return Err(ValidationError::offset_sensitive());
        }
        match q.limit {
            None => return Err(ValidationError::limit_required()),
            Some(limit) if limit > SENSITIVE_MAX_ROWS => {
                return Err(ValidationError::limit_exceeds(limit, SENSITIVE_MAX_ROWS));
            }
            Some(_) => {}
        }

        // JOIN
        for join in &q.joins {
            if join.kind != JoinKind::Inner {
                return Err(ValidationError::join_not_inner());
            }
            if let Some(on) = &join.on {
                self.check_join_on(q, on, depth)?;
            }
        }

        // WHERE
        if let Some(w) = &q.where_clause {
            self.check_sensitive_where(q, w, depth)?;
        }

        // SELECT
        for item in &q.select_items {
            if self.has_sensitive(q, &item.value)? && item.value.as_column().is_none() {
                return Err(ValidationError::sensitive_select_expr());
            }
            self.pass_b_subqueries(&item.value, depth)?;
        }

        // GROUP BY / HAVING / ORDER BY
        let clauses = q
            .group_by
            .iter()
            .map(|e| ("GROUP BY", e))
            .chain(q.having.iter().map(|e| ("HAVING", e)))
            .chain(q.order_by.iter().map(|e| ("ORDER BY", e)));
        for (clause, e) in clauses {
            if let Some(col) = self.find_sensitive(q, e, 0)? {
                return Err(ValidationError::sensitive_in_clause(clause, &col.to_string()));
            }
            self.pass_b_subqueries(e, depth)?;
        }

        for cte in &q.ctes {
            self.pass_b(&cte.query, depth + 1)?;
        }
        for fi in q.range_items() {
            if let FromKind::Subquery(sub) = &fi.kind {
                self.pass_b(sub, depth + 1)?;
            }
        }
        Ok(())
    }

    fn pass_b_subqueries(&self, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        self.for_each_subquery(e, depth, &|sub, d| self.pass_b(sub, d))
    }

    /// JOIN ON must be an AND of `=` between columns or literals, none of
    /// them sensitive.
    fn check_join_on(&self, q: &Query, e: &Expr, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        match e {
            Expr::And(l, r) => {
                self.check_join_on(q, l, depth + 1)?;
                self.check_join_on(q, r, depth + 1)
            }
            Expr::Compare {
                op: CompareOp::Eq,
                left,
                right,
            } => {
                if !is_simple_operand(left) || !is_simple_operand(right) {
                    return Err(ValidationError::join_operands_not_simple());
                }
                if self.has_sensitive(q, left)? || self.has_sensitive(q, right)? {
                    return Err(ValidationError::join_on_sensitive(
                        &left.to_string(),
                        &right.to_string(),
                    ));
                }
                Ok(())
            }
            _ => Err(ValidationError::join_on_not_equalities()),
        }
    }

    /// WHERE in sensitive mode: an AND of predicates where each sensitive
    /// column is referenced directly and compared only to parameters.
    fn check_sensitive_where(
        &self,
        q: &Query,
        e: &Expr,
        depth: usize,
    ) -> Result<(), ValidationError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ValidationError::too_deep());
        }
        match e {
            Expr::Subquery(sub) => self.pass_b(sub, depth + 1),
            Expr::And(l, r) => {
                self.check_sensitive_where(q, l, depth + 1)?;
                self.check_sensitive_where(q, r, depth + 1)
            }
            Expr::Compare {
                op: CompareOp::Eq,
                left,
                right,
            } => {
                let sens_left = self.find_sensitive(q, left, 0)?;
                let sens_right = self.find_sensitive(q, right, 0)?;
                for (col, side, other) in [(sens_left, left, right), (sens_right, right, left)] {
                    let Some(col) = col else { continue };
                    if side.as_column().is_none() {
                        return Err(ValidationError::sensitive_not_direct(
                            &col.to_string(),
                            "WHERE",
                        ));
                    }
                    if !other.is_param() {
                        return Err(ValidationError::sensitive_compare_non_param(
                            &col.to_string(),
                        ));
                    }
                }
                self.pass_b_subqueries(left, depth + 1)?;
                self.pass_b_subqueries(right, depth + 1)
            }
            Expr::In { lhs, items } => {
                let sens_lhs = self.find_sensitive(q, lhs, 0)?;
                if let Some(col) = sens_lhs {
                    if lhs.as_column().is_none() {
                        return Err(ValidationError::sensitive_not_direct(
                            &col.to_string(),
                            "IN()",
                        ));
                    }
                }
                for item in items {
                    if let Some(col) = sens_lhs {
                        if !item.is_param() {
                            return Err(ValidationError::sensitive_compare_non_param(
                                &col.to_string(),
                            ));
                        }
                    }
                    if let Some(col) = self.find_sensitive(q, item, 0)? {
                        return Err(ValidationError::sensitive_in_list(&col.to_string()));
                    }
                    self.pass_b_subqueries(item, depth + 1)?;
                }
                self.pass_b_subqueries(lhs, depth + 1)
            }
            Expr::Or(..) | Expr::Not(_) => Err(ValidationError::where_not_conjunction()),
            _ => Err(ValidationError::unsupported_sensitive_predicate()),
        }
    }

    // =========================================================================
    // Output plan
    // =========================================================================

    fn output_columns(&self, q: &Query) -> Result<Vec<OutputColumn>, ValidationError> {
        q.select_items
            .iter()
            .map(|item| {
                let Some(col) = item.value.as_column() else {
                    return Ok(OutputColumn::Plaintext);
                };
                let from = q
                    .find_alias(&col.qualifier)
                    .ok_or_else(ValidationError::analyze_fail)?;
                let FromKind::BaseRel { schema, name } = &from.kind else {
                    return Ok(OutputColumn::Plaintext);
                };
                if !self.profile.is_column_sensitive(schema, name, &col.column) {
                    return Ok(OutputColumn::Plaintext);
                }
                let column_id = if schema.is_empty() {
                    format!("{}.{}", name, col.column)
                } else {
                    format!("{}.{}.{}", schema, name, col.column)
                };
                Ok(OutputColumn::Token {
                    column_id,
                    strategy: self.profile.column_strategy(schema, name, &col.column),
                })
            })
            .collect()
    }
}

/// Whether `e` contains a parameter outside of subqueries.
fn has_param(e: &Expr) -> bool {
    match e {
        Expr::Param(_) => true,
        Expr::Subquery(_) => false,
        other => other.children().into_iter().any(has_param),
    }
}

fn is_simple_operand(e: &Expr) -> bool {
    matches!(e, Expr::Column(_) | Expr::Literal(_))
}
