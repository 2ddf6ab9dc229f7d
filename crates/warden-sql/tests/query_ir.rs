//! Integration tests for lowering PostgreSQL statements into the query IR.
//!
//! Run with: cargo test --package warden-sql --test query_ir

use pretty_assertions::assert_eq;
use warden_core::ir::{
    CompareOp, Expr, FromItem, FromKind, JoinKind, Literal, Query, QueryStatus, TypeName,
};
use warden_core::QueryProducer;
use warden_sql::PostgresBackend;

fn lower(sql: &str) -> Query {
    PostgresBackend::new().make_query_ir(sql)
}

fn lower_ok(sql: &str) -> Query {
    let q = lower(sql);
    assert!(q.is_ok(), "{:?}: {:?}", q.status(), q.status_reason());
    q
}

fn assert_unsupported(sql: &str) {
    let q = lower(sql);
    assert_eq!(q.status(), QueryStatus::Unsupported, "{}", sql);
}

/// Comparisons, AND and literals map one to one.
#[test]
fn test_predicates_and_limit() {
    let q = lower_ok(
        "SELECT p.id AS pid FROM private.people AS p \
         WHERE p.age >= 25 AND p.region = 'c' LIMIT 200;",
    );

    assert_eq!(q.limit, Some(200));
    assert!(!q.has_star);
    assert_eq!(q.select_items.len(), 1);
    assert_eq!(q.select_items[0].alias, "pid");
    assert_eq!(q.select_items[0].value, Expr::column("p", "id"));
    assert_eq!(q.from_items, vec![FromItem::base("private", "people", "p")]);
    assert_eq!(
        q.where_clause,
        Some(Expr::and(
            Expr::compare(
                CompareOp::Ge,
                Expr::column("p", "age"),
                Expr::Literal(Literal::Int64(25)),
            ),
            Expr::compare(
                CompareOp::Eq,
                Expr::column("p", "region"),
                Expr::Literal(Literal::String("c".into())),
            ),
        ))
    );
}

/// Positional parameters keep their index.
#[test]
fn test_params_predicates() {
    let q = lower_ok(
        "SELECT p.id AS pid FROM private.people AS p \
         WHERE p.age >= $1 AND p.region = $2 LIMIT 200;",
    );
    assert_eq!(
        q.where_clause,
        Some(Expr::and(
            Expr::compare(CompareOp::Ge, Expr::column("p", "age"), Expr::Param(1)),
            Expr::compare(CompareOp::Eq, Expr::column("p", "region"), Expr::Param(2)),
        ))
    );
}

/// IN lists keep every item in order.
#[test]
fn test_in_list_params() {
    let q = lower_ok(
        "SELECT p.name AS name FROM private.people AS p \
         WHERE p.region IN ($1, $2, $3) LIMIT 50;",
    );
    assert_eq!(
        q.where_clause,
        Some(Expr::In {
            lhs: Box::new(Expr::column("p", "region")),
            items: vec![Expr::Param(1), Expr::Param(2), Expr::Param(3)],
        })
    );
}

/// NOT IN becomes a negated IN.
#[test]
fn test_not_in() {
    let q = lower_ok("SELECT p.id FROM people p WHERE p.id NOT IN (1, 2)");
    let Some(Expr::Not(inner)) = q.where_clause else {
        panic!("expected NOT");
    };
    assert!(matches!(*inner, Expr::In { .. }));
}

/// DISTINCT ON marks the block distinct and keeps ORDER BY.
#[test]
fn test_distinct_on() {
    let q = lower_ok(
        "SELECT DISTINCT ON (p.region) p.region AS region, p.name AS name \
         FROM private.people AS p ORDER BY p.region, p.name LIMIT 20;",
    );
    assert!(q.has_distinct);
    assert_eq!(q.order_by.len(), 2);
}

/// `x::t` becomes a cast with a lower-case type name.
#[test]
fn test_casts() {
    let q = lower_ok("SELECT p.age::text AS age_txt FROM private.people AS p LIMIT 10;");
    assert_eq!(
        q.select_items[0].value,
        Expr::Cast {
            expr: Box::new(Expr::column("p", "age")),
            ty: TypeName {
                schema: String::new(),
                name: "text".into(),
            },
        }
    );
}

/// Nested casts stay nested.
#[test]
fn test_cast_chains() {
    let q = lower_ok("SELECT (p.age::text)::varchar AS age_txt FROM private.people AS p LIMIT 10;");
    let Expr::Cast { expr, ty } = &q.select_items[0].value else {
        panic!("expected cast");
    };
    assert_eq!(ty.name, "varchar");
    assert!(matches!(expr.as_ref(), Expr::Cast { .. }));
}

/// Quoted identifiers are case-folded like unquoted ones.
#[test]
fn test_quoted_identifiers() {
    let q = lower_ok(
        "SELECT p.\"NaMe\" AS \"outName\" FROM \"Private\".\"People\" AS p \
         WHERE p.\"AgE\" > 25 LIMIT 10;",
    );
    assert_eq!(q.select_items[0].value, Expr::column("p", "name"));
    assert_eq!(q.select_items[0].alias, "outname");
    assert_eq!(q.from_items[0], FromItem::base("private", "people", "p"));
}

/// `= ANY($1)` is treated as an IN list with one item.
#[test]
fn test_any_as_in() {
    let q = lower_ok("SELECT p.name AS name FROM private.people AS p WHERE p.region = ANY($1) LIMIT 10;");
    assert_eq!(
        q.where_clause,
        Some(Expr::In {
            lhs: Box::new(Expr::column("p", "region")),
            items: vec![Expr::Param(1)],
        })
    );
}

/// JSON access collapses to the column being read.
#[test]
fn test_json_operator_reads_column() {
    let q = lower_ok("SELECT p.profile->>'ssn' AS ssn FROM private.people AS p LIMIT 10;");
    assert_eq!(q.select_items[0].value, Expr::column("p", "profile"));
}

/// BETWEEN and IS NULL desugar into comparisons.
#[test]
fn test_between_and_null_checks() {
    let q = lower_ok("SELECT p.id FROM people p WHERE p.age BETWEEN 1 AND 9");
    assert_eq!(
        q.where_clause,
        Some(Expr::and(
            Expr::compare(CompareOp::Ge, Expr::column("p", "age"), Expr::Literal(Literal::Int64(1))),
            Expr::compare(CompareOp::Le, Expr::column("p", "age"), Expr::Literal(Literal::Int64(9))),
        ))
    );

    let q = lower_ok("SELECT p.id FROM people p WHERE p.age IS NOT NULL");
    assert_eq!(
        q.where_clause,
        Some(Expr::compare(
            CompareOp::Ne,
            Expr::column("p", "age"),
            Expr::Literal(Literal::Null),
        ))
    );
}

/// Star projections are flagged, function `*` arguments are not.
#[test]
fn test_star_detection() {
    assert!(lower_ok("SELECT * FROM users u").has_star);
    assert!(lower_ok("SELECT u.name, e.* FROM users u JOIN expenses e ON e.user_id = u.id").has_star);

    let q = lower_ok("SELECT COUNT(*) FROM users u");
    assert!(!q.has_star);
    let Expr::Function(call) = &q.select_items[0].value else {
        panic!("expected function call");
    };
    assert_eq!(call.name, "count");
    assert!(call.is_star);
}

/// Join kinds and their predicates.
#[test]
fn test_join_kinds() {
    let q = lower_ok(
        "SELECT u.id FROM users u \
         JOIN a x ON x.id = u.id \
         LEFT JOIN b y ON y.id = u.id \
         CROSS JOIN c z \
         FULL JOIN d w ON w.id = u.id",
    );
    let kinds: Vec<JoinKind> = q.joins.iter().map(|j| j.kind).collect();
    assert_eq!(
        kinds,
        vec![JoinKind::Inner, JoinKind::Left, JoinKind::Cross, JoinKind::Full]
    );
    assert!(q.joins[2].on.is_none());
    assert_eq!(q.joins[0].rhs, FromItem::base("", "a", "x"));
}

/// CTE names resolve in FROM and JOIN of the same block.
#[test]
fn test_cte_references() {
    let q = lower_ok("WITH t AS (SELECT u.id FROM users u) SELECT x.id FROM t x JOIN public.t y ON y.id = x.id");
    assert_eq!(q.ctes.len(), 1);
    assert_eq!(q.ctes[0].name, "t");
    assert_eq!(q.from_items[0].kind, FromKind::CteRef("t".into()));
    // A schema-qualified name is always a table.
    assert!(q.joins[0].rhs.is_base_rel());
}

/// Derived tables become subqueries; VALUES keeps its column names.
#[test]
fn test_derived_tables() {
    let q = lower_ok("SELECT s.id FROM (SELECT u.id FROM users u) s");
    assert!(matches!(q.from_items[0].kind, FromKind::Subquery(_)));
    assert_eq!(q.from_items[0].alias, "s");

    let q = lower_ok("SELECT v.a FROM (VALUES (1, 2)) AS v(a, b)");
    assert_eq!(
        q.from_items[0].kind,
        FromKind::Values {
            column_names: vec!["a".into(), "b".into()],
        }
    );
}

/// EXISTS and scalar subqueries become subquery expressions.
#[test]
fn test_subquery_expressions() {
    let q = lower_ok("SELECT u.id FROM users u WHERE NOT EXISTS (SELECT c.id FROM cards c WHERE c.owner = 1)");
    let Some(Expr::Not(inner)) = &q.where_clause else {
        panic!("expected NOT");
    };
    assert!(matches!(inner.as_ref(), Expr::Subquery(_)));
}

/// A bare ORDER BY name matching one output alias sorts by that expression.
#[test]
fn test_order_by_alias() {
    let q = lower_ok("SELECT u.fiscal_code AS fc FROM users u ORDER BY fc");
    assert_eq!(q.order_by, vec![Expr::column("u", "fiscal_code")]);

    // GROUP BY does not resolve aliases.
    let q = lower_ok("SELECT u.fiscal_code AS fc FROM users u GROUP BY fc");
    assert_eq!(q.group_by, vec![Expr::column("", "fc")]);
}

/// Window functions keep partition and order expressions.
#[test]
fn test_window_function() {
    let q = lower_ok("SELECT row_number() OVER (PARTITION BY u.country ORDER BY u.id) AS rn FROM users u");
    let Expr::Window(w) = &q.select_items[0].value else {
        panic!("expected window function");
    };
    assert_eq!(w.func.name, "row_number");
    assert_eq!(w.partition_by, vec![Expr::column("u", "country")]);
    assert_eq!(w.order_by, vec![Expr::column("u", "id")]);
    assert!(!w.has_frame);
}

/// OFFSET is recorded.
#[test]
fn test_offset() {
    let q = lower_ok("SELECT u.id FROM users u LIMIT 10 OFFSET 10");
    assert_eq!(q.limit, Some(10));
    assert!(q.has_offset);
}

/// Non-SELECT statements never reach the validator as queries.
#[test]
fn test_non_select_statements_rejected() {
    assert_unsupported("SET statement_timeout = 0;");
    assert_unsupported("DELETE FROM users");
    assert_unsupported("UPDATE users SET name = 'x'");

    for sql in [
        "COPY (SELECT p.name FROM private.people AS p) TO PROGRAM 'cat /etc/passwd';",
        "DO $$ BEGIN PERFORM pg_sleep(1); END $$;",
    ] {
        assert_ne!(lower(sql).status(), QueryStatus::Ok, "{}", sql);
    }
}

/// Constructs outside the supported subset are rejected.
#[test]
fn test_unsupported_constructs() {
    assert_unsupported(
        "WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n+1 FROM t WHERE n < 5) \
         SELECT t.n AS n FROM t LIMIT 10;",
    );
    assert_unsupported("SELECT p.name AS name FROM private.people AS p WHERE (p.region, p.age) = ($1, $2) LIMIT 10;");
    assert_unsupported("SELECT p.id AS pid, x.v AS v FROM private.people AS p JOIN LATERAL (SELECT p.age AS v) AS x ON true LIMIT 10;");
    assert_unsupported("SELECT x.val AS val FROM unnest(ARRAY[1,2,3]) AS x(val) LIMIT 10;");
    assert_unsupported("SELECT p.id AS pid FROM private.people AS p WHERE p.updated_at > NOW() - INTERVAL '1 DAY';");
    assert_unsupported("SELECT p.id AS pid FROM private.people AS p WHERE p.id = ANY(ARRAY[1,2,3]);");
    assert_unsupported("SELECT p.flags AS flags FROM private.people AS p WHERE (p.flags & 4) = 4;");
    assert_unsupported("SELECT u.id FROM users u UNION SELECT c.id FROM cards c");
    assert_unsupported("SELECT u.id FROM users u FOR UPDATE");
    assert_unsupported("SELECT u.id FROM users u JOIN cards c USING (id)");
    assert_unsupported("SELECT u.id FROM users u NATURAL JOIN cards c");
    assert_unsupported("SELECT a.b.c.d FROM users u");
    assert_unsupported("SELECT COUNT(*) FILTER (WHERE u.id > 1) FROM users u");
}
