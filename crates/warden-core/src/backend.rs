//! Capabilities a database backend provides to the validator.

use crate::ir::Query;

/// Turns SQL text into a [`Query`].
///
/// Producers never fail: parse errors and unsupported constructs are carried
/// in the returned query's status so the caller sees one uniform result.
pub trait QueryProducer: Send + Sync {
    fn make_query_ir(&self, sql: &str) -> Query;
}

/// Backend-owned allowlist of functions that are safe to call.
///
/// The backend list is global: a match applies regardless of schema.
/// Per-connection additions live in
/// [`SafeFunctionPolicy`](crate::policy::SafeFunctionPolicy).
pub trait FunctionSafety: Send + Sync {
    fn is_function_safe(&self, schema: &str, name: &str) -> bool;
}

/// A sorted, static list of lower-case function names.
///
/// Lookups use binary search, so the list must be sorted and unique.
#[derive(Debug, Clone, Copy)]
pub struct SortedFunctionList {
    names: &'static [&'static str],
}

impl SortedFunctionList {
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        debug_assert!(self.names.windows(2).all(|w| w[0] < w[1]));
        self.names.binary_search_by(|probe| (*probe).cmp(name)).is_ok()
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FunctionSafety for SortedFunctionList {
    fn is_function_safe(&self, _schema: &str, name: &str) -> bool {
        self.contains(name)
    }
}
