//! Lowering of sqlparser's PostgreSQL AST into the query IR.
//!
//! Only the restricted `SELECT` subset the validator understands is lowered.
//! The first construct outside that subset stops lowering and the whole
//! statement comes back as [`QueryStatus::Unsupported`] with a short reason.

use sqlparser::ast::{
    self, BinaryOperator, DataType, Distinct, DuplicateTreatment, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, JoinConstraint, JoinOperator, LimitClause, ObjectName,
    ObjectNamePart, OrderByKind, SetExpr, Statement, TableAlias, TableFactor, UnaryOperator, Value,
    WindowType,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use warden_core::ir::{
    CaseExpr, CaseWhen, CompareOp, Cte, Expr, FromItem, FromKind, FuncCall, Join, JoinKind,
    Literal, Query, QueryStatus, SelectItem, TypeName, WindowFunc, MAX_NESTING_DEPTH,
};

/// Reason a statement could not be lowered.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Unsupported(String);

type Lowered<T> = Result<T, Unsupported>;

fn unsupported<T>(reason: impl Into<String>) -> Lowered<T> {
    Err(Unsupported(reason.into()))
}

/// Parse `sql` and lower its single statement.
pub(crate) fn lower_sql(dialect: &PostgreSqlDialect, sql: &str) -> Query {
    let statements = match Parser::parse_sql(dialect, sql) {
        Ok(statements) => statements,
        Err(e) => {
            tracing::debug!(error = %e, "SQL parse failed");
            return Query::failed(QueryStatus::ParseError, e.to_string());
        }
    };

    let statement = match statements.as_slice() {
        [] => return Query::failed(QueryStatus::ParseError, "empty query"),
        [statement] => statement,
        _ => return Query::failed(QueryStatus::ParseError, "multiple statements"),
    };

    let Statement::Query(query) = statement else {
        return Query::failed(QueryStatus::Unsupported, "unsupported statement type");
    };

    match lower_query(query, 0) {
        Ok(q) => q,
        Err(Unsupported(reason)) => {
            tracing::debug!(%reason, "unsupported SQL construct");
            Query::failed(QueryStatus::Unsupported, reason)
        }
    }
}

fn check_depth(depth: usize) -> Lowered<()> {
    if depth > MAX_NESTING_DEPTH {
        return unsupported("query nesting is too deep");
    }
    Ok(())
}

// =============================================================================
// Query blocks
// =============================================================================

fn lower_query(query: &ast::Query, depth: usize) -> Lowered<Query> {
    check_depth(depth)?;
    let mut q = Query::new();

    if let Some(with) = &query.with {
        if with.recursive {
            return unsupported("recursive CTE not supported");
        }
        for cte in &with.cte_tables {
            q.ctes.push(Cte {
                name: ident(&cte.alias.name),
                query: lower_query(&cte.query, depth + 1)?,
            });
        }
    }

    if query.fetch.is_some() {
        return unsupported("FETCH not supported");
    }
    if !query.locks.is_empty() {
        return unsupported("locking clause not supported");
    }

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        SetExpr::SetOperation { .. } => return unsupported("set operations not supported"),
        SetExpr::Values(_) => return unsupported("VALUES statement not supported"),
        _ => return unsupported("unsupported query body"),
    };
    lower_select(select, &mut q, depth)?;

    if let Some(order_by) = &query.order_by {
        match &order_by.kind {
            OrderByKind::Expressions(exprs) => {
                for item in exprs {
                    let e = lower_order_item(&item.expr, &q, depth)?;
                    q.order_by.push(e);
                }
            }
            _ => return unsupported("unsupported ORDER BY"),
        }
    }

    if let Some(clause) = &query.limit_clause {
        match clause {
            LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            } => {
                if !limit_by.is_empty() {
                    return unsupported("LIMIT BY not supported");
                }
                if let Some(limit) = limit {
                    q.limit = Some(lower_limit(limit)?);
                }
                q.has_offset = offset.is_some();
            }
            _ => return unsupported("unsupported LIMIT form"),
        }
    }

    Ok(q)
}

fn lower_select(select: &ast::Select, q: &mut Query, depth: usize) -> Lowered<()> {
    if select.top.is_some() {
        return unsupported("TOP not supported");
    }
    if select.into.is_some() {
        return unsupported("SELECT INTO not supported");
    }
    if select.qualify.is_some() {
        return unsupported("QUALIFY not supported");
    }
    if !select.named_window.is_empty() {
        return unsupported("named windows not supported");
    }

    q.has_distinct = matches!(
        select.distinct,
        Some(Distinct::Distinct) | Some(Distinct::On(_))
    );

    for item in &select.projection {
        match item {
            ast::SelectItem::UnnamedExpr(e) => q.select_items.push(SelectItem {
                value: lower_expr(e, depth + 1)?,
                alias: String::new(),
            }),
            ast::SelectItem::ExprWithAlias { expr, alias } => q.select_items.push(SelectItem {
                value: lower_expr(expr, depth + 1)?,
                alias: ident(alias),
            }),
            ast::SelectItem::Wildcard(_) | ast::SelectItem::QualifiedWildcard(..) => {
                q.has_star = true;
            }
            #[allow(unreachable_patterns)]
            _ => return unsupported("unsupported SELECT item"),
        }
    }

    for table in &select.from {
        let item = lower_table_factor(&table.relation, &q.ctes, depth)?;
        q.from_items.push(item);
        for join in &table.joins {
            let (kind, on) = lower_join_operator(&join.join_operator, depth)?;
            let rhs = lower_table_factor(&join.relation, &q.ctes, depth)?;
            q.joins.push(Join { kind, rhs, on });
        }
    }

    q.where_clause = lower_opt(select.selection.as_ref(), depth)?;

    match &select.group_by {
        GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                return unsupported("GROUP BY modifiers not supported");
            }
            for e in exprs {
                let e = match positional_item(e, q)? {
                    Some(item) => item,
                    None => lower_expr(e, depth + 1)?,
                };
                q.group_by.push(e);
            }
        }
        GroupByExpr::All(_) => return unsupported("GROUP BY ALL not supported"),
    }

    q.having = lower_opt(select.having.as_ref(), depth)?;
    Ok(())
}

/// An ORDER BY item naming exactly one output alias, or giving its
/// position, sorts by that item.
fn lower_order_item(e: &ast::Expr, q: &Query, depth: usize) -> Lowered<Expr> {
    if let Some(item) = positional_item(e, q)? {
        return Ok(item);
    }
    if let ast::Expr::Identifier(id) = e {
        let name = ident(id);
        let mut matches = q.select_items.iter().filter(|item| item.alias == name);
        match (matches.next(), matches.next()) {
            (Some(item), None) => return Ok(item.value.clone()),
            (Some(_), Some(_)) => return unsupported("ambiguous ORDER BY alias"),
            _ => {}
        }
    }
    lower_expr(e, depth + 1)
}

/// A bare number in ORDER BY or GROUP BY refers to a SELECT item by its
/// 1-based position.
fn positional_item(e: &ast::Expr, q: &Query) -> Lowered<Option<Expr>> {
    let ast::Expr::Value(v) = e else {
        return Ok(None);
    };
    let Value::Number(n, _) = &v.value else {
        return Ok(None);
    };
    if q.has_star {
        return unsupported("positional reference next to *");
    }
    match n.parse::<usize>() {
        Ok(k) if (1..=q.select_items.len()).contains(&k) => {
            Ok(Some(q.select_items[k - 1].value.clone()))
        }
        _ => unsupported(format!("position {} is not in the SELECT list", n)),
    }
}

fn lower_limit(e: &ast::Expr) -> Lowered<u32> {
    let ast::Expr::Value(v) = e else {
        return unsupported("LIMIT must be an integer literal");
    };
    let Value::Number(n, _) = &v.value else {
        return unsupported("LIMIT must be an integer literal");
    };
    match n.parse::<u32>() {
        Ok(limit) if limit <= i32::MAX as u32 => Ok(limit),
        _ => unsupported("LIMIT out of range"),
    }
}

// =============================================================================
// FROM and JOIN
// =============================================================================

fn lower_table_factor(tf: &TableFactor, ctes: &[Cte], depth: usize) -> Lowered<FromItem> {
    check_depth(depth)?;
    match tf {
        TableFactor::Table {
            name, alias, args, ..
        } => {
            if args.is_some() {
                return unsupported("table functions not supported");
            }
            if alias.as_ref().is_some_and(|a| !a.columns.is_empty()) {
                return unsupported("column aliases on tables not supported");
            }
            let (schema, rel) = object_name(name)?;
            let alias = alias_name(alias.as_ref());
            if schema.is_empty() && ctes.iter().any(|c| c.name == rel) {
                return Ok(FromItem {
                    kind: FromKind::CteRef(rel),
                    alias,
                });
            }
            Ok(FromItem::base(schema, rel, alias))
        }
        TableFactor::Derived {
            lateral,
            subquery,
            alias,
            ..
        } => {
            if *lateral {
                return unsupported("LATERAL not supported");
            }
            if let SetExpr::Values(_) = subquery.body.as_ref() {
                let column_names = alias
                    .as_ref()
                    .map(|a| a.columns.iter().map(|c| ident(&c.name)).collect())
                    .unwrap_or_default();
                return Ok(FromItem {
                    kind: FromKind::Values { column_names },
                    alias: alias_name(alias.as_ref()),
                });
            }
            Ok(FromItem::subquery(
                lower_query(subquery, depth + 1)?,
                alias_name(alias.as_ref()),
            ))
        }
        TableFactor::NestedJoin { .. } => unsupported("nested joins not supported"),
        _ => unsupported("unsupported FROM item"),
    }
}

fn lower_join_operator(op: &JoinOperator, depth: usize) -> Lowered<(JoinKind, Option<Expr>)> {
    let (kind, constraint) = match op {
        JoinOperator::Join(c) | JoinOperator::Inner(c) => (JoinKind::Inner, c),
        JoinOperator::Left(c) | JoinOperator::LeftOuter(c) => (JoinKind::Left, c),
        JoinOperator::Right(c) | JoinOperator::RightOuter(c) => (JoinKind::Right, c),
        JoinOperator::FullOuter(c) => (JoinKind::Full, c),
        JoinOperator::CrossJoin(c) => (JoinKind::Cross, c),
        _ => return unsupported("unsupported join type"),
    };
    match constraint {
        JoinConstraint::On(e) => Ok((kind, Some(lower_expr(e, depth + 1)?))),
        JoinConstraint::None if kind == JoinKind::Inner => Ok((JoinKind::Cross, None)),
        JoinConstraint::None => Ok((kind, None)),
        JoinConstraint::Using(_) => unsupported("JOIN USING not supported"),
        JoinConstraint::Natural => unsupported("NATURAL JOIN not supported"),
    }
}

// =============================================================================
// Expressions
// =============================================================================

fn lower_opt(e: Option<&ast::Expr>, depth: usize) -> Lowered<Option<Expr>> {
    e.map(|e| lower_expr(e, depth + 1)).transpose()
}

fn lower_list(exprs: &[ast::Expr], depth: usize) -> Lowered<Vec<Expr>> {
    exprs.iter().map(|e| lower_expr(e, depth)).collect()
}

fn lower_expr(e: &ast::Expr, depth: usize) -> Lowered<Expr> {
    check_depth(depth)?;
    let d = depth + 1;

    let lowered = match e {
        ast::Expr::Identifier(id) => Expr::column("", ident(id)),
        ast::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [column] => Expr::column("", ident(column)),
            [qualifier, column] => Expr::column(ident(qualifier), ident(column)),
            _ => return unsupported("column reference with more than two parts"),
        },
        ast::Expr::Value(v) => lower_value(&v.value)?,
        ast::Expr::Nested(inner) => lower_expr(inner, d)?,

        ast::Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => Expr::Not(Box::new(lower_expr(expr, d)?)),
            UnaryOperator::Minus => negate(lower_expr(expr, d)?)?,
            _ => return unsupported("unsupported unary operator"),
        },
        ast::Expr::BinaryOp { left, op, right } => lower_binary(left, op, right, d)?,

        ast::Expr::Like {
            negated,
            any,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if *any || escape_char.is_some() {
                return unsupported("unsupported LIKE form");
            }
            let op = if *negated {
                CompareOp::NotLike
            } else {
                CompareOp::Like
            };
            Expr::compare(op, lower_expr(expr, d)?, lower_expr(pattern, d)?)
        }
        ast::Expr::Between {
            expr,
            negated,
            low,
            high,
            ..
        } => {
            let x = lower_expr(expr, d)?;
            let low = lower_expr(low, d)?;
            let high = lower_expr(high, d)?;
            if *negated {
                Expr::or(
                    Expr::compare(CompareOp::Lt, x.clone(), low),
                    Expr::compare(CompareOp::Gt, x, high),
                )
            } else {
                Expr::and(
                    Expr::compare(CompareOp::Ge, x.clone(), low),
                    Expr::compare(CompareOp::Le, x, high),
                )
            }
        }
        ast::Expr::IsNull(inner) => Expr::compare(
            CompareOp::Eq,
            lower_expr(inner, d)?,
            Expr::Literal(Literal::Null),
        ),
        ast::Expr::IsNotNull(inner) => Expr::compare(
            CompareOp::Ne,
            lower_expr(inner, d)?,
            Expr::Literal(Literal::Null),
        ),

        ast::Expr::InList {
            expr,
            list,
            negated,
            ..
        } => negate_if(
            *negated,
            Expr::In {
                lhs: Box::new(lower_expr(expr, d)?),
                items: lower_list(list, d)?,
            },
        ),
        ast::Expr::InSubquery {
            expr,
            subquery,
            negated,
            ..
        } => negate_if(
            *negated,
            Expr::In {
                lhs: Box::new(lower_expr(expr, d)?),
                items: vec![Expr::Subquery(Box::new(lower_query(subquery, d)?))],
            },
        ),
        ast::Expr::Exists { subquery, negated } => negate_if(
            *negated,
            Expr::Subquery(Box::new(lower_query(subquery, d)?)),
        ),
        ast::Expr::Subquery(query) => Expr::Subquery(Box::new(lower_query(query, d)?)),

        ast::Expr::AnyOp {
            left,
            compare_op,
            right,
            ..
        } => lower_quantified(left, compare_op, right, BinaryOperator::Eq, false, d)?,
        ast::Expr::AllOp {
            left,
            compare_op,
            right,
            ..
        } => lower_quantified(left, compare_op, right, BinaryOperator::NotEq, true, d)?,

        ast::Expr::Cast {
            expr,
            data_type,
            format,
            ..
        } => {
            if format.is_some() {
                return unsupported("CAST FORMAT not supported");
            }
            Expr::Cast {
                expr: Box::new(lower_expr(expr, d)?),
                ty: type_name(data_type)?,
            }
        }
        ast::Expr::Function(f) => lower_function(f, d)?,
        ast::Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            let arg = match operand {
                Some(operand) => Some(Box::new(lower_expr(operand, d)?)),
                None => None,
            };
            let whens = conditions
                .iter()
                .map(|cw| {
                    Ok(CaseWhen {
                        when: lower_expr(&cw.condition, d)?,
                        then: lower_expr(&cw.result, d)?,
                    })
                })
                .collect::<Lowered<Vec<_>>>()?;
            let else_result = match else_result {
                Some(e) => Some(Box::new(lower_expr(e, d)?)),
                None => None,
            };
            Expr::Case(CaseExpr {
                arg,
                whens,
                else_result,
            })
        }

        ast::Expr::Tuple(_) => return unsupported("row comparison not supported"),
        ast::Expr::Array(_) => return unsupported("ARRAY not supported"),
        ast::Expr::Interval(_) => return unsupported("INTERVAL not supported"),
        _ => return unsupported("unsupported expression"),
    };
    Ok(lowered)
}

fn negate_if(negated: bool, e: Expr) -> Expr {
    if negated {
        Expr::Not(Box::new(e))
    } else {
        e
    }
}

fn negate(e: Expr) -> Lowered<Expr> {
    match e {
        Expr::Literal(Literal::Int64(v)) => match v.checked_neg() {
            Some(v) => Ok(Expr::Literal(Literal::Int64(v))),
            None => unsupported("numeric literal out of range"),
        },
        Expr::Literal(Literal::Float64(v)) => Ok(Expr::Literal(Literal::Float64(-v))),
        _ => unsupported("arithmetic not supported"),
    }
}

fn lower_binary(
    left: &ast::Expr,
    op: &BinaryOperator,
    right: &ast::Expr,
    depth: usize,
) -> Lowered<Expr> {
    let compare = |op: CompareOp| -> Lowered<Expr> {
        Ok(Expr::compare(op, lower_expr(left, depth)?, lower_expr(right, depth)?))
    };
    match op {
        BinaryOperator::Eq => compare(CompareOp::Eq),
        BinaryOperator::NotEq => compare(CompareOp::Ne),
        BinaryOperator::Gt => compare(CompareOp::Gt),
        BinaryOperator::GtEq => compare(CompareOp::Ge),
        BinaryOperator::Lt => compare(CompareOp::Lt),
        BinaryOperator::LtEq => compare(CompareOp::Le),
        BinaryOperator::PGLikeMatch => compare(CompareOp::Like),
        BinaryOperator::PGNotLikeMatch => compare(CompareOp::NotLike),
        BinaryOperator::And => Ok(Expr::and(
            lower_expr(left, depth)?,
            lower_expr(right, depth)?,
        )),
        BinaryOperator::Or => Ok(Expr::or(
            lower_expr(left, depth)?,
            lower_expr(right, depth)?,
        )),
        // JSON access reads its left operand; the path must be a constant.
        BinaryOperator::Arrow
        | BinaryOperator::LongArrow
        | BinaryOperator::HashArrow
        | BinaryOperator::HashLongArrow => match lower_expr(right, depth)? {
            Expr::Literal(_) => lower_expr(left, depth),
            _ => unsupported("JSON path must be a literal"),
        },
        _ => unsupported("unsupported operator"),
    }
}

/// `x = ANY(e)` is `x IN (e)` and `x <> ALL(e)` is `x NOT IN (e)`.
fn lower_quantified(
    left: &ast::Expr,
    compare_op: &BinaryOperator,
    right: &ast::Expr,
    expected: BinaryOperator,
    negated: bool,
    depth: usize,
) -> Lowered<Expr> {
    if *compare_op != expected {
        return unsupported("unsupported ANY/ALL comparison");
    }
    if matches!(right, ast::Expr::Array(_)) {
        return unsupported("ARRAY not supported");
    }
    Ok(negate_if(
        negated,
        Expr::In {
            lhs: Box::new(lower_expr(left, depth)?),
            items: vec![lower_expr(right, depth)?],
        },
    ))
}

fn lower_value(v: &Value) -> Lowered<Expr> {
    let literal = match v {
        Value::Number(n, _) => match n.parse::<i64>() {
            Ok(i) => Literal::Int64(i),
            Err(_) => match n.parse::<f64>() {
                Ok(f) => Literal::Float64(f),
                Err(_) => return unsupported("invalid numeric literal"),
            },
        },
        Value::SingleQuotedString(s) => Literal::String(s.clone()),
        Value::Boolean(b) => Literal::Bool(*b),
        Value::Null => Literal::Null,
        Value::Placeholder(p) => {
            return match p.strip_prefix('$').and_then(|n| n.parse::<u32>().ok()) {
                Some(index) if index > 0 => Ok(Expr::Param(index)),
                _ => unsupported("only positional $n parameters are supported"),
            };
        }
        _ => return unsupported("unsupported literal"),
    };
    Ok(Expr::Literal(literal))
}

fn lower_function(f: &ast::Function, depth: usize) -> Lowered<Expr> {
    if f.filter.is_some() {
        return unsupported("FILTER not supported");
    }
    if !f.within_group.is_empty() {
        return unsupported("WITHIN GROUP not supported");
    }
    if f.null_treatment.is_some() {
        return unsupported("IGNORE/RESPECT NULLS not supported");
    }
    if !matches!(f.parameters, FunctionArguments::None) {
        return unsupported("parametric functions not supported");
    }

    let (schema, name) = object_name(&f.name)?;
    let mut call = FuncCall::new(schema, name, Vec::new());

    match &f.args {
        FunctionArguments::None => {}
        FunctionArguments::Subquery(_) => {
            return unsupported("subquery function arguments not supported");
        }
        FunctionArguments::List(list) => {
            if !list.clauses.is_empty() {
                return unsupported("function argument clauses not supported");
            }
            call.is_distinct =
                matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                        call.args.push(lower_expr(e, depth)?);
                    }
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => call.is_star = true,
                    _ => return unsupported("unsupported function argument"),
                }
            }
        }
    }

    match &f.over {
        None => Ok(Expr::Function(call)),
        Some(WindowType::WindowSpec(spec)) => {
            if spec.window_name.is_some() {
                return unsupported("named windows not supported");
            }
            let partition_by = lower_list(&spec.partition_by, depth)?;
            let order_by = spec
                .order_by
                .iter()
                .map(|o| lower_expr(&o.expr, depth))
                .collect::<Lowered<Vec<_>>>()?;
            Ok(Expr::Window(Box::new(WindowFunc {
                func: call,
                partition_by,
                order_by,
                has_frame: spec.window_frame.is_some(),
            })))
        }
        Some(_) => unsupported("named windows not supported"),
    }
}

// =============================================================================
// Names
// =============================================================================

/// Identifiers are case-folded whether or not they were quoted.
fn ident(id: &Ident) -> String {
    id.value.to_lowercase()
}

fn alias_name(alias: Option<&TableAlias>) -> String {
    alias.map(|a| ident(&a.name)).unwrap_or_default()
}

/// Split `[schema.]name`.
fn object_name(name: &ObjectName) -> Lowered<(String, String)> {
    let parts = name
        .0
        .iter()
        .map(|part| match part {
            ObjectNamePart::Identifier(id) => Some(ident(id)),
            #[allow(unreachable_patterns)]
            _ => None,
        })
        .collect::<Option<Vec<_>>>();
    match parts.as_deref() {
        Some([name]) => Ok((String::new(), name.clone())),
        Some([schema, name]) => Ok((schema.clone(), name.clone())),
        Some(_) => unsupported("name with more than two parts"),
        None => unsupported("unsupported name"),
    }
}

fn type_name(data_type: &DataType) -> Lowered<TypeName> {
    if let DataType::Custom(name, modifiers) = data_type {
        if !modifiers.is_empty() {
            return unsupported("type modifiers not supported");
        }
        let (schema, name) = object_name(name)?;
        return Ok(TypeName { schema, name });
    }
    Ok(TypeName {
        schema: String::new(),
        name: data_type.to_string().to_lowercase(),
    })
}
