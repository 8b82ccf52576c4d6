//! Row predicate combinators.
//!
//! Small pure helpers for building `where` arguments. They compose freely:
//!
//! ```rust,ignore
//! use mistfall_core::predicate::{and, eq, gt};
//!
//! let active_adults = and(eq("active", true), gt("age", 17i64));
//! client.select("users", SelectOptions::new().filter(active_adults))?;
//! ```

use mistfall_store::{Row, Value};
use std::cmp::Ordering;

/// Matches rows whose column equals `value`.
pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> impl Fn(&Row) -> bool {
    let column = column.into();
    let value = value.into();
    move |row| row.get(&column) == Some(&value)
}

/// Matches rows whose column differs from `value` (including rows that do
/// not carry the column).
pub fn neq(column: impl Into<String>, value: impl Into<Value>) -> impl Fn(&Row) -> bool {
    let column = column.into();
    let value = value.into();
    move |row| row.get(&column) != Some(&value)
}

/// Matches rows whose column orders strictly greater than `value`.
pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> impl Fn(&Row) -> bool {
    let column = column.into();
    let value = value.into();
    move |row| {
        row.get(&column)
            .is_some_and(|v| v.cmp_order(&value) == Ordering::Greater)
    }
}

/// Matches rows whose column orders strictly less than `value`.
pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> impl Fn(&Row) -> bool {
    let column = column.into();
    let value = value.into();
    move |row| {
        row.get(&column)
            .is_some_and(|v| v.cmp_order(&value) == Ordering::Less)
    }
}

/// Matches rows satisfying both predicates.
pub fn and(
    a: impl Fn(&Row) -> bool,
    b: impl Fn(&Row) -> bool,
) -> impl Fn(&Row) -> bool {
    move |row| a(row) && b(row)
}

/// Matches rows satisfying either predicate.
pub fn or(
    a: impl Fn(&Row) -> bool,
    b: impl Fn(&Row) -> bool,
) -> impl Fn(&Row) -> bool {
    move |row| a(row) || b(row)
}
