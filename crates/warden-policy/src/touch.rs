//! Column touch extraction.
//!
//! Walks a [`Query`] and records every column reference together with the
//! scope it appears in and what its qualifier resolves to. The report is
//! consumed by the validator to decide whether sensitive mode applies and
//! where sensitive columns are allowed to appear.
//!
//! Qualifiers resolve against the FROM and JOIN items of the block that
//! contains the reference, never against an outer block, so correlated
//! references come out as [`TouchKind::Unknown`].

use warden_core::ir::{ColumnRef, Expr, FromKind, JoinKind, Query, MAX_NESTING_DEPTH};

/// Where a reference appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Directly in the top-level block.
    Main,
    /// Inside a CTE, derived table, or expression subquery.
    Nested,
}

/// What a reference's qualifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    /// A table or view.
    Base,
    /// A derived table or CTE.
    Derived,
    /// Nothing that can be resolved safely.
    Unknown,
}

/// One column reference.
#[derive(Debug, Clone, Copy)]
pub struct Touch<'q> {
    pub scope: Scope,
    pub kind: TouchKind,
    pub column: &'q ColumnRef,
    /// The block the reference belongs to, used for alias lookups.
    pub source: &'q Query,
}

/// Every column reference of a query, in walk order.
#[derive(Debug, Clone, Default)]
pub struct TouchReport<'q> {
    /// The classified references.
    pub touches: Vec<Touch<'q>>,
    /// At least one reference is [`TouchKind::Unknown`].
    pub has_unknown_touches: bool,
    /// Something in the tree could not be modeled; the query must be
    /// rejected.
    pub has_unsupported: bool,
}

/// Classify every column reference in `query`.
pub fn extract_touches(query: &Query) -> TouchReport<'_> {
    let mut report = TouchReport::default();
    walk_query(query, Scope::Main, 0, &mut report);
    report
}

fn walk_query<'q>(q: &'q Query, scope: Scope, depth: usize, report: &mut TouchReport<'q>) {
    if depth > MAX_NESTING_DEPTH {
        report.has_unsupported = true;
        return;
    }
    if !q.is_ok() {
        report.has_unsupported = true;
    }

    for cte in &q.ctes {
        walk_query(&cte.query, Scope::Nested, depth + 1, report);
    }

    for fi in &q.from_items {
        match &fi.kind {
            FromKind::Subquery(sub) => walk_query(sub, Scope::Nested, depth + 1, report),
            FromKind::Unsupported => report.has_unsupported = true,
            _ => {}
        }
    }

    for join in &q.joins {
        if join.kind == JoinKind::Unsupported {
            report.has_unsupported = true;
        }
        match &join.rhs.kind {
            FromKind::Subquery(sub) => walk_query(sub, Scope::Nested, depth + 1, report),
            FromKind::Unsupported => report.has_unsupported = true,
            _ => {}
        }
        if let Some(on) = &join.on {
            walk_expr(q, on, scope, depth + 1, report);
        }
    }

    for item in &q.select_items {
        walk_expr(q, &item.value, scope, depth + 1, report);
    }
    if let Some(w) = &q.where_clause {
        walk_expr(q, w, scope, depth + 1, report);
    }
    for e in &q.group_by {
        walk_expr(q, e, scope, depth + 1, report);
    }
    if let Some(h) = &q.having {
        walk_expr(q, h, scope, depth + 1, report);
    }
    for e in &q.order_by {
        walk_expr(q, e, scope, depth + 1, report);
    }
}

fn walk_expr<'q>(
    owner: &'q Query,
    e: &'q Expr,
    scope: Scope,
    depth: usize,
    report: &mut TouchReport<'q>,
) {
    if depth > MAX_NESTING_DEPTH {
        report.has_unsupported = true;
        return;
    }

    match e {
        Expr::Column(col) => {
            let kind = resolve_qualifier(owner, &col.qualifier);
            if kind == TouchKind::Unknown {
                report.has_unknown_touches = true;
            }
            report.touches.push(Touch {
                scope,
                kind,
                column: col,
                source: owner,
            });
        }
        Expr::Subquery(sub) => walk_query(sub, Scope::Nested, depth + 1, report),
        Expr::Unsupported => report.has_unsupported = true,
        other => {
            for child in other.children() {
                walk_expr(owner, child, scope, depth + 1, report);
            }
        }
    }
}

/// Resolve `qualifier` against the range items of `q`.
fn resolve_qualifier(q: &Query, qualifier: &str) -> TouchKind {
    if qualifier.is_empty() {
        return TouchKind::Unknown;
    }

    if let Some(fi) = q.find_alias(qualifier) {
        return match fi.kind {
            FromKind::BaseRel { .. } => TouchKind::Base,
            FromKind::Subquery(_) | FromKind::CteRef(_) => TouchKind::Derived,
            FromKind::Values { .. } | FromKind::Unsupported => TouchKind::Unknown,
        };
    }

    // `FROM expenses ... expenses.user_id`: the database binds the bare
    // relation name, so the reference does read a base table even though
    // the validator will refuse to resolve it.
    let names_unaliased_base = q.range_items().any(|fi| {
        fi.alias.is_empty()
            && matches!(&fi.kind, FromKind::BaseRel { name, .. } if name == qualifier)
    });
    if names_unaliased_base {
        TouchKind::Base
    } else {
        TouchKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ir::{CompareOp, Cte, FromItem, Join, QueryStatus, SelectItem};

    fn select(value: Expr) -> SelectItem {
        SelectItem {
            value,
            alias: String::new(),
        }
    }

    fn users_query() -> Query {
        let mut q = Query::new();
        q.from_items.push(FromItem::base("", "users", "u"));
        q.select_items.push(select(Expr::column("u", "name")));
        q
    }

    #[test]
    fn test_main_scope_base_touch() {
        let q = users_query();
        let report = extract_touches(&q);

        assert_eq!(report.touches.len(), 1);
        let t = &report.touches[0];
        assert_eq!(t.scope, Scope::Main);
        assert_eq!(t.kind, TouchKind::Base);
        assert_eq!(t.column.to_string(), "u.name");
        assert!(!report.has_unknown_touches);
        assert!(!report.has_unsupported);
    }

    #[test]
    fn test_subquery_touches_are_nested() {
        let inner = users_query();
        let mut q = Query::new();
        q.from_items.push(FromItem::subquery(inner, "x"));
        q.select_items.push(select(Expr::column("x", "name")));

        let report = extract_touches(&q);
        assert_eq!(report.touches.len(), 2);
        // Nested blocks are walked before the block's own clauses.
        assert_eq!(report.touches[0].scope, Scope::Nested);
        assert_eq!(report.touches[0].kind, TouchKind::Base);
        assert_eq!(report.touches[1].scope, Scope::Main);
        assert_eq!(report.touches[1].kind, TouchKind::Derived);
    }

    #[test]
    fn test_cte_reference_is_derived() {
        let mut q = Query::new();
        q.ctes.push(Cte {
            name: "c".into(),
            query: users_query(),
        });
        q.from_items.push(FromItem {
            kind: FromKind::CteRef("c".into()),
            alias: "c1".into(),
        });
        q.select_items.push(select(Expr::column("c1", "name")));

        let report = extract_touches(&q);
        assert_eq!(report.touches[0].scope, Scope::Nested);
        assert_eq!(report.touches[1].kind, TouchKind::Derived);
    }

    #[test]
    fn test_unqualified_and_correlated_are_unknown() {
        let mut inner = Query::new();
        inner.from_items.push(FromItem::base("", "cards", "c"));
        inner.select_items.push(select(Expr::column("c", "id")));
        inner.where_clause = Some(Expr::compare(
            CompareOp::Eq,
            Expr::column("c", "owner"),
            Expr::column("u", "id"),
        ));

        let mut q = users_query();
        q.select_items.push(select(Expr::column("", "age")));
        q.where_clause = Some(Expr::Subquery(Box::new(inner)));

        let report = extract_touches(&q);
        assert!(report.has_unknown_touches);
        let unknown: Vec<String> = report
            .touches
            .iter()
            .filter(|t| t.kind == TouchKind::Unknown)
            .map(|t| t.column.to_string())
            .collect();
        assert_eq!(unknown, vec!["age".to_string(), "u.id".to_string()]);
    }

    #[test]
    fn test_join_rhs_alias_resolves() {
        let mut q = users_query();
        q.joins.push(Join {
            kind: JoinKind::Inner,
            rhs: FromItem::base("", "expenses", "e"),
            on: Some(Expr::compare(
                CompareOp::Eq,
                Expr::column("e", "user_id"),
                Expr::column("u", "id"),
            )),
        });

        let report = extract_touches(&q);
        assert!(report.touches.iter().all(|t| t.kind == TouchKind::Base));
        assert_eq!(report.touches[0].column.to_string(), "e.user_id");
    }

    #[test]
    fn test_unaliased_relation_name_is_base() {
        let mut q = users_query();
        q.joins.push(Join {
            kind: JoinKind::Inner,
            rhs: FromItem::base("", "expenses", ""),
            on: Some(Expr::compare(
                CompareOp::Eq,
                Expr::column("expenses", "user_id"),
                Expr::column("u", "id"),
            )),
        });

        let report = extract_touches(&q);
        assert_eq!(report.touches[0].kind, TouchKind::Base);
        assert!(!report.has_unknown_touches);
    }

    #[test]
    fn test_unsupported_anywhere_is_flagged() {
        let mut q = users_query();
        q.having = Some(Expr::Unsupported);
        assert!(extract_touches(&q).has_unsupported);

        let mut inner = users_query();
        inner.set_status(QueryStatus::Unsupported, "unsupported operator");
        let mut q = users_query();
        q.where_clause = Some(Expr::Subquery(Box::new(inner)));
        assert!(extract_touches(&q).has_unsupported);

        let mut q = users_query();
        q.from_items.push(FromItem {
            kind: FromKind::Unsupported,
            alias: "f".into(),
        });
        assert!(extract_touches(&q).has_unsupported);
    }

    #[test]
    fn test_depth_cap() {
        let mut q = users_query();
        for _ in 0..=MAX_NESTING_DEPTH {
            let mut outer = Query::new();
            outer.from_items.push(FromItem::subquery(q, "s"));
            outer.select_items.push(select(Expr::column("s", "name")));
            q = outer;
        }
        assert!(extract_touches(&q).has_unsupported);
    }
}
