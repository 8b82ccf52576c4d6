//! Property-based test generators using proptest.
//!
//! Strategies produce random row batches and scalar values that respect
//! the fixture schemas' shapes, so property tests exercise the runtime
//! rather than fight schema validation.

use mistfall_core::{Row, Value};
use proptest::prelude::*;

/// Strategy for valid identifier-like names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("valid regex")
}

/// Strategy for scalar cell values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        name_strategy().prop_map(Value::Text),
        (0i64..4_102_444_800_000).prop_map(Value::Timestamp),
    ]
}

/// Strategy for arbitrary cell values, nesting scalars into arrays and
/// maps. Suits structured-value columns.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(name_strategy(), inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for a batch of `users` rows (each carrying only `name`), sized
/// within `range`.
pub fn user_batch_strategy(range: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        name_strategy().prop_map(|name| Row::new().with("name", name)),
        range,
    )
}

/// Strategy for `users` rows where some drop the not-null `name` column.
pub fn lossy_user_batch_strategy(
    range: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec(
        (name_strategy(), any::<bool>()).prop_map(|(name, keep)| {
            if keep {
                Row::new().with("name", name)
            } else {
                Row::new()
            }
        }),
        range,
    )
}
