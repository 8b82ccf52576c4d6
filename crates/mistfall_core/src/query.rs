//! In-memory query evaluation.
//!
//! The evaluator runs over already-materialized row arrays; nothing is
//! pushed down to the backing store. Filtering, stable ordering, optional
//! reversal, offset, and limit are applied in that order.

use mistfall_store::{Row, Value};
use std::fmt;
use std::sync::Arc;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Ascending (the default).
    #[default]
    Asc,
    /// Descending: the stably sorted result is reversed.
    Desc,
}

/// Sort key selector: a column name, or a function deriving an orderable
/// key from the row.
#[derive(Clone)]
pub enum OrderBy {
    /// Order by a column's value; rows without the column sort as null.
    Column(String),
    /// Order by a derived key. Selectors should return scalar keys
    /// (numbers, strings, timestamps); ordering of non-scalar keys follows
    /// [`Value::cmp_order`].
    Key(Arc<dyn Fn(&Row) -> Value + Send + Sync>),
}

impl fmt::Debug for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBy::Column(name) => f.debug_tuple("Column").field(name).finish(),
            OrderBy::Key(_) => f.write_str("Key(..)"),
        }
    }
}

impl OrderBy {
    fn key_of(&self, row: &Row) -> Value {
        match self {
            OrderBy::Column(name) => row.get(name).cloned().unwrap_or(Value::Null),
            OrderBy::Key(selector) => selector(row),
        }
    }
}

/// Options for a select: filter, order, pagination.
///
/// ```rust,ignore
/// let options = SelectOptions::new()
///     .filter(|row| row.get("v") == Some(&Value::Integer(1)))
///     .order_by("id")
///     .order(Order::Desc)
///     .offset(1)
///     .limit(1);
/// ```
#[derive(Default)]
pub struct SelectOptions {
    filter: Option<Box<dyn Fn(&Row) -> bool>>,
    order_by: Option<OrderBy>,
    order: Order,
    limit: Option<usize>,
    offset: usize,
}

impl SelectOptions {
    /// Creates empty options: no filter, natural order, no pagination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retains only rows for which the predicate returns true.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&Row) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Orders by a column.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy::Column(column.into()));
        self
    }

    /// Orders by a derived key.
    #[must_use]
    pub fn order_by_key(mut self, selector: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        self.order_by = Some(OrderBy::Key(Arc::new(selector)));
        self
    }

    /// Sets the sort direction.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Keeps at most `limit` rows.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Applies select options to a materialized row array.
///
/// Sorting is stable: rows whose keys compare equal keep their incoming
/// order. A descending order reverses the sorted result wholesale.
#[must_use]
pub fn evaluate(rows: Vec<Row>, options: &SelectOptions) -> Vec<Row> {
    let rows: Vec<Row> = match &options.filter {
        Some(predicate) => rows.into_iter().filter(|row| predicate(row)).collect(),
        None => rows,
    };

    let rows = match &options.order_by {
        Some(order_by) => {
            let mut keyed: Vec<(Value, Row)> = rows
                .into_iter()
                .map(|row| (order_by.key_of(&row), row))
                .collect();
            keyed.sort_by(|(a, _), (b, _)| a.cmp_order(b));
            if options.order == Order::Desc {
                keyed.reverse();
            }
            keyed.into_iter().map(|(_, row)| row).collect()
        }
        None => rows,
    };

    rows.into_iter()
        .skip(options.offset)
        .take(options.limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, v: i64) -> Row {
        Row::new().with("id", id).with("v", v)
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.get("id").and_then(Value::as_integer).unwrap())
            .collect()
    }

    #[test]
    fn no_options_preserves_input() {
        let rows = vec![row(3, 0), row(1, 0), row(2, 0)];
        let result = evaluate(rows, &SelectOptions::new());
        assert_eq!(ids(&result), vec![3, 1, 2]);
    }

    #[test]
    fn filter_retains_matches() {
        let rows = (1..=5).map(|i| row(i, i % 3)).collect();
        let result = evaluate(
            rows,
            &SelectOptions::new().filter(|r| r.get("v") == Some(&Value::Integer(1))),
        );
        assert_eq!(ids(&result), vec![1, 4]);
    }

    #[test]
    fn order_by_column_ascending() {
        let rows = vec![row(2, 0), row(3, 0), row(1, 0)];
        let result = evaluate(rows, &SelectOptions::new().order_by("id"));
        assert_eq!(ids(&result), vec![1, 2, 3]);
    }

    #[test]
    fn descending_reverses_after_stable_sort() {
        let rows = vec![row(1, 7), row(2, 7), row(3, 5)];
        let result = evaluate(
            rows,
            &SelectOptions::new().order_by("v").order(Order::Desc),
        );
        // Ascending stable sort gives [3, 1, 2]; reversal gives [2, 1, 3].
        assert_eq!(ids(&result), vec![2, 1, 3]);
    }

    #[test]
    fn equal_keys_keep_incoming_order() {
        let rows = vec![row(5, 1), row(4, 1), row(3, 1)];
        let result = evaluate(rows, &SelectOptions::new().order_by("v"));
        assert_eq!(ids(&result), vec![5, 4, 3]);
    }

    #[test]
    fn order_by_key_selector() {
        let rows = vec![row(1, 9), row(2, 3), row(3, 6)];
        let result = evaluate(
            rows,
            &SelectOptions::new()
                .order_by_key(|r| r.get("v").cloned().unwrap_or(Value::Null)),
        );
        assert_eq!(ids(&result), vec![2, 3, 1]);
    }

    #[test]
    fn offset_then_limit() {
        let rows = (1..=5).map(|i| row(i, 0)).collect();
        let result = evaluate(
            rows,
            &SelectOptions::new().order_by("id").offset(1).limit(2),
        );
        assert_eq!(ids(&result), vec![2, 3]);
    }

    #[test]
    fn offset_past_end_yields_empty() {
        let rows = vec![row(1, 0)];
        let result = evaluate(rows, &SelectOptions::new().offset(5));
        assert!(result.is_empty());
    }

    #[test]
    fn missing_order_column_sorts_first() {
        let rows = vec![row(1, 0), Row::new().with("id", 2i64)];
        let result = evaluate(rows, &SelectOptions::new().order_by("v"));
        // The row without "v" keys as null, which sorts before integers.
        assert_eq!(ids(&result), vec![2, 1]);
    }

    #[test]
    fn filter_sort_reverse_paginate_combination() {
        // Five rows of {id, v: id % 3}; filter v == 1, desc by id,
        // offset 1, limit 1 leaves exactly the row with id 1.
        let rows = (1..=5).map(|i| row(i, i % 3)).collect();
        let result = evaluate(
            rows,
            &SelectOptions::new()
                .filter(|r| r.get("v") == Some(&Value::Integer(1)))
                .order_by("id")
                .order(Order::Desc)
                .offset(1)
                .limit(1),
        );
        assert_eq!(ids(&result), vec![1]);
    }
}
