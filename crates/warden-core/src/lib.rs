//! # warden-core
//!
//! Shared building blocks for Warden, a gatekeeper that decides whether an
//! agent-issued SQL statement may run against a database holding sensitive
//! columns.
//!
//! - [`ir`]: the normalized query representation every analysis works on
//! - [`backend`]: capabilities a database backend plugs in (SQL producer,
//!   builtin function allowlist)
//! - [`policy`]: sorted sensitive-column and safe-function tables
//! - [`config`]: the connection catalog and safety policy

pub mod backend;
pub mod config;
pub mod ir;
pub mod policy;

pub use backend::{FunctionSafety, QueryProducer, SortedFunctionList};
pub use config::{Catalog, ConfigError, ConnectionProfile, SafetyPolicy};
pub use ir::{
    CaseExpr, CaseWhen, ColumnRef, CompareOp, Cte, Expr, FromItem, FromKind, FuncCall, Join,
    JoinKind, Literal, Query, QueryStatus, SelectItem, TypeName, WindowFunc, MAX_NESTING_DEPTH,
};
pub use policy::{ColumnPolicy, ColumnRule, PolicyEntryError, SafeFunctionPolicy, SafeFunctionRule};
