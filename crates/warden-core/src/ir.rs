//! Normalized query representation.
//!
//! A [`Query`] is a passive, owned tree describing one restricted `SELECT`
//! block. Producers (see [`crate::backend::QueryProducer`]) build it from SQL
//! text; the touch extractor and validator only ever read it.
//!
//! # Conventions
//!
//! - Identifiers are lower-cased. An empty string means "absent", e.g. an
//!   unqualified column or a FROM item without alias.
//! - Anything a producer cannot model safely is recorded explicitly, either
//!   as [`Expr::Unsupported`], [`FromKind::Unsupported`],
//!   [`JoinKind::Unsupported`] or a non-`Ok` [`QueryStatus`]. Nothing is
//!   silently dropped.

use std::fmt;

/// Maximum nesting of query blocks and expressions accepted by producers and
/// by every recursive analysis pass.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Outcome of building a query block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Ok,
    /// The SQL text could not be parsed.
    ParseError,
    /// The SQL parsed, but uses a construct the IR cannot represent.
    Unsupported,
}

/// One query block (`SELECT ... FROM ... WHERE ...`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    status: QueryStatus,
    status_reason: Option<String>,

    /// `*` or `alias.*` appears in this block's SELECT list.
    pub has_star: bool,
    /// `DISTINCT` or `DISTINCT ON` was used.
    pub has_distinct: bool,
    /// `OFFSET` was used.
    pub has_offset: bool,

    pub ctes: Vec<Cte>,
    pub select_items: Vec<SelectItem>,
    pub from_items: Vec<FromItem>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<Expr>,

    /// Literal LIMIT value, `None` when the block has no LIMIT.
    pub limit: Option<u32>,
}

impl Query {
    /// Create an empty block with status `Ok`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty block already carrying a failure status.
    pub fn failed(status: QueryStatus, reason: impl Into<String>) -> Self {
        let mut q = Self::new();
        q.set_status(status, reason);
        q
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == QueryStatus::Ok
    }

    /// Record a failure status. The first non-`Ok` status wins; later calls
    /// are ignored so the reason always describes the earliest problem.
    pub fn set_status(&mut self, status: QueryStatus, reason: impl Into<String>) {
        if status == QueryStatus::Ok || self.status != QueryStatus::Ok {
            return;
        }
        self.status = status;
        self.status_reason = Some(reason.into());
    }

    /// Find the FROM item or JOIN right-hand side carrying `alias`.
    ///
    /// Only this block's own range items are searched; empty aliases never
    /// match.
    pub fn find_alias(&self, alias: &str) -> Option<&FromItem> {
        if alias.is_empty() {
            return None;
        }
        self.range_items().find(|fi| fi.alias == alias)
    }

    /// FROM items followed by JOIN right-hand sides, in declaration order.
    pub fn range_items(&self) -> impl Iterator<Item = &FromItem> {
        self.from_items
            .iter()
            .chain(self.joins.iter().map(|j| &j.rhs))
    }
}

/// `WITH name AS (query)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Query,
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub value: Expr,
    /// Output alias (`AS name`), empty when absent.
    pub alias: String,
}

/// A FROM-list entry or the right-hand side of a JOIN.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub kind: FromKind,
    /// Range alias. Required by the validator, but may be empty here.
    pub alias: String,
}

impl FromItem {
    pub fn base(
        schema: impl Into<String>,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            kind: FromKind::BaseRel {
                schema: schema.into(),
                name: name.into(),
            },
            alias: alias.into(),
        }
    }

    pub fn subquery(query: Query, alias: impl Into<String>) -> Self {
        Self {
            kind: FromKind::Subquery(Box::new(query)),
            alias: alias.into(),
        }
    }

    pub fn is_base_rel(&self) -> bool {
        matches!(self.kind, FromKind::BaseRel { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromKind {
    /// A table or view, optionally schema-qualified.
    BaseRel { schema: String, name: String },
    /// A derived table.
    Subquery(Box<Query>),
    /// A reference to a CTE of the same block.
    CteRef(String),
    /// `(VALUES ...) AS alias(columns)`.
    Values { column_names: Vec<String> },
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub rhs: FromItem,
    /// Join predicate. Only cross joins have none.
    pub on: Option<Expr>,
}

/// A column reference, `qualifier.column` or bare `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(qualifier: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
        }
    }
}

/// A function invocation, `schema.name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub schema: String,
    pub name: String,
    pub args: Vec<Expr>,
    /// `f(DISTINCT ...)`.
    pub is_distinct: bool,
    /// `f(*)`. This does not count as a star projection.
    pub is_star: bool,
}

impl FuncCall {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            args,
            is_distinct: false,
            is_star: false,
        }
    }
}

/// Target type of a cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub when: Expr,
    pub then: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    /// `CASE arg WHEN ...`; `None` for the searched form.
    pub arg: Option<Box<Expr>>,
    pub whens: Vec<CaseWhen>,
    pub else_result: Option<Box<Expr>>,
}

/// `func(...) OVER (PARTITION BY ... ORDER BY ... [frame])`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunc {
    pub func: FuncCall,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<Expr>,
    pub has_frame: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// Positional parameter `$n`.
    Param(u32),
    Literal(Literal),
    Function(FuncCall),
    Cast { expr: Box<Expr>, ty: TypeName },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `lhs IN (items)`. An `IN (subquery)` has a single subquery item.
    In { lhs: Box<Expr>, items: Vec<Expr> },
    Case(CaseExpr),
    Window(Box<WindowFunc>),
    Subquery(Box<Query>),
    Unsupported,
}

impl Expr {
    pub fn column(qualifier: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(qualifier, column))
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Expr::Or(Box::new(left), Box::new(right))
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_param(&self) -> bool {
        matches!(self, Expr::Param(_))
    }

    /// Direct sub-expressions, excluding subquery bodies.
    ///
    /// Every recursive walk over expressions goes through this so that new
    /// variants only need to be wired in one place.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_)
            | Expr::Param(_)
            | Expr::Literal(_)
            | Expr::Subquery(_)
            | Expr::Unsupported => Vec::new(),
            Expr::Function(f) => f.args.iter().collect(),
            Expr::Cast { expr, .. } => vec![expr.as_ref()],
            Expr::Compare { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::And(l, r) | Expr::Or(l, r) => vec![l.as_ref(), r.as_ref()],
            Expr::Not(inner) => vec![inner.as_ref()],
            Expr::In { lhs, items } => {
                std::iter::once(lhs.as_ref()).chain(items.iter()).collect()
            }
            Expr::Case(c) => {
                let mut out = Vec::with_capacity(c.whens.len() * 2 + 2);
                if let Some(arg) = &c.arg {
                    out.push(arg.as_ref());
                }
                for w in &c.whens {
                    out.push(&w.when);
                    out.push(&w.then);
                }
                if let Some(e) = &c.else_result {
                    out.push(e.as_ref());
                }
                out
            }
            Expr::Window(w) => w
                .func
                .args
                .iter()
                .chain(w.partition_by.iter())
                .chain(w.order_by.iter())
                .collect(),
        }
    }
}

// =============================================================================
// Diagnostic rendering
// =============================================================================

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifier.is_empty() {
            write!(f, "{}", self.column)
        } else {
            write!(f, "{}.{}", self.qualifier, self.column)
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Int64(v) => write!(f, "{}", v),
            Literal::Float64(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl fmt::Display for FuncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.schema.is_empty() {
            write!(f, "{}.", self.schema)?;
        }
        write!(f, "{}(", self.name)?;
        if self.is_distinct {
            write!(f, "DISTINCT ")?;
        }
        if self.is_star {
            write!(f, "*")?;
        }
        write_list(f, &self.args)?;
        write!(f, ")")
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}", c),
            Expr::Param(n) => write!(f, "${}", n),
            Expr::Literal(l) => write!(f, "{}", l),
            Expr::Function(func) => write!(f, "{}", func),
            Expr::Cast { expr, ty } => write!(f, "{}::{}", expr, ty),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::In { lhs, items } => {
                write!(f, "{} IN (", lhs)?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Case(c) => {
                write!(f, "CASE")?;
                if let Some(arg) = &c.arg {
                    write!(f, " {}", arg)?;
                }
                for w in &c.whens {
                    write!(f, " WHEN {} THEN {}", w.when, w.then)?;
                }
                if let Some(e) = &c.else_result {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::Window(w) => {
                write!(f, "{} OVER (", w.func)?;
                if !w.partition_by.is_empty() {
                    write!(f, "PARTITION BY ")?;
                    write_list(f, &w.partition_by)?;
                    if !w.order_by.is_empty() {
                        write!(f, " ")?;
                    }
                }
                if !w.order_by.is_empty() {
                    write!(f, "ORDER BY ")?;
                    write_list(f, &w.order_by)?;
                }
                write!(f, ")")
            }
            Expr::Subquery(_) => write!(f, "(subquery)"),
            Expr::Unsupported => write!(f, "<unsupported>"),
        }
    }
}

impl fmt::Display for FromItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FromKind::BaseRel { schema, name } if schema.is_empty() => write!(f, "{}", name)?,
            FromKind::BaseRel { schema, name } => write!(f, "{}.{}", schema, name)?,
            FromKind::Subquery(_) => write!(f, "(subquery)")?,
            FromKind::CteRef(name) => write!(f, "{}", name)?,
            FromKind::Values { .. } => write!(f, "(VALUES)")?,
            FromKind::Unsupported => write!(f, "<unsupported>")?,
        }
        if !self.alias.is_empty() {
            write!(f, " {}", self.alias)?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
