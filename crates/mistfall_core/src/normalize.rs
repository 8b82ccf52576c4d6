//! Adapter-agnostic write normalization.
//!
//! Every insert and update funnels through this pipeline. Backend-specific
//! behavior — identity allocation and foreign-key lookup — is injected via
//! [`NormalizationContext`], so the pipeline itself is identical for the
//! memory backend and the engine backend.

use crate::error::{CoreError, CoreResult};
use crate::schema::{IndexSource, Table};
use mistfall_store::{Key, Row, Value};

/// Backend services the pipeline needs for one write.
pub trait NormalizationContext {
    /// Allocates the next identity value for `table`.
    ///
    /// Allocations are strictly increasing per table. An allocation may
    /// outlive a failed row (gaps are permitted).
    fn allocate_identity(&mut self, table: &Table) -> CoreResult<Value>;

    /// Whether a row keyed `key` exists in `target_table`.
    fn reference_exists(&mut self, target_table: &str, key: &Key) -> CoreResult<bool>;
}

/// Normalizes a row for insertion into `table`.
///
/// Applies, in declaration order per column: identity allocation, default
/// producers, literal defaults, and the not-null check; then foreign-key
/// existence checks; then computed-index materialization.
///
/// # Errors
///
/// Returns a not-null violation if a not-null column resolves to null or
/// stays absent, or a foreign-key violation if a referenced row is missing.
pub fn normalize_insert(
    table: &Table,
    input: &Row,
    ctx: &mut dyn NormalizationContext,
) -> CoreResult<Row> {
    let mut row = input.clone();

    for column in table.columns() {
        if row.get(column.name()).is_none() {
            if column.is_identity() {
                let allocated = ctx.allocate_identity(table)?;
                row.set(column.name(), allocated);
            } else if let Some(producer) = column.default_producer() {
                row.set(column.name(), producer());
            } else if let Some(literal) = column.literal_default() {
                row.set(column.name(), literal.clone());
            }
        }
        check_not_null(table, column.name(), &row)?;
    }

    check_foreign_keys(table, &row, ctx)?;
    apply_computed_indexes(table, &mut row);
    Ok(row)
}

/// Normalizes an update of `existing` with `patch`.
///
/// The merged row starts as `existing` shallow-merged with `patch`. Update
/// hooks run only for columns the patch does not explicitly carry — carrying
/// a column, even as `Null`, suppresses its hook. Not-null and foreign-key
/// checks then re-run over every column, and computed index fields are
/// re-derived.
pub fn normalize_update(
    table: &Table,
    existing: &Row,
    patch: &Row,
    ctx: &mut dyn NormalizationContext,
) -> CoreResult<Row> {
    let mut row = existing.merged(patch);

    for column in table.columns() {
        if !patch.contains(column.name()) {
            if let Some(hook) = column.update_hook() {
                row.set(column.name(), hook(existing.get(column.name())));
            }
        }
    }

    for column in table.columns() {
        check_not_null(table, column.name(), &row)?;
    }

    check_foreign_keys(table, &row, ctx)?;
    apply_computed_indexes(table, &mut row);
    Ok(row)
}

fn check_not_null(table: &Table, column: &str, row: &Row) -> CoreResult<()> {
    let Some(descriptor) = table.get_column(column) else {
        return Ok(());
    };
    if !descriptor.is_not_null() {
        return Ok(());
    }
    match row.get(column) {
        None | Some(Value::Null) => Err(CoreError::not_null(table.name(), column)),
        Some(_) => Ok(()),
    }
}

fn check_foreign_keys(
    table: &Table,
    row: &Row,
    ctx: &mut dyn NormalizationContext,
) -> CoreResult<()> {
    for column in table.columns() {
        let Some(fk) = column.foreign_key() else {
            continue;
        };
        let Some(value) = row.get(column.name()) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        let violation = || CoreError::ForeignKeyViolation {
            table: table.name().to_string(),
            column: column.name().to_string(),
            target_table: fk.target_table.clone(),
            target_column: fk.target_column.clone(),
            value: value.clone(),
        };

        // A value that cannot be a key cannot match any referenced row.
        let Ok(key) = Key::try_from(value) else {
            return Err(violation());
        };
        if !ctx.reference_exists(&fk.target_table, &key)? {
            return Err(violation());
        }
    }
    Ok(())
}

/// Materializes computed index keys as real row fields so the backing store
/// can index them.
fn apply_computed_indexes(table: &Table, row: &mut Row) {
    for index in table.indexes() {
        if let IndexSource::Computed { field, expression } = index.source() {
            let value = expression(row);
            row.set(field.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Index, Schema, SchemaOptions};
    use std::collections::BTreeSet;

    /// Context with a scripted set of existing reference keys.
    struct FakeContext {
        next: i64,
        known: BTreeSet<(String, Key)>,
    }

    impl FakeContext {
        fn new() -> Self {
            Self {
                next: 0,
                known: BTreeSet::new(),
            }
        }

        fn knowing(table: &str, key: Key) -> Self {
            let mut ctx = Self::new();
            ctx.known.insert((table.to_string(), key));
            ctx
        }
    }

    impl NormalizationContext for FakeContext {
        fn allocate_identity(&mut self, _table: &Table) -> CoreResult<Value> {
            self.next += 1;
            Ok(Value::Integer(self.next))
        }

        fn reference_exists(&mut self, target_table: &str, key: &Key) -> CoreResult<bool> {
            Ok(self.known.contains(&(target_table.to_string(), key.clone())))
        }
    }

    fn users_table() -> Table {
        Table::new("users")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::text("name").not_null())
            .column(Column::enumeration("role", ["a", "b"]).default_value("a"))
    }

    fn schema_table(table: Table) -> Table {
        let schema = Schema::build(SchemaOptions::new("test"), vec![table]).unwrap();
        schema.tables()[0].clone()
    }

    #[test]
    fn insert_allocates_identity_and_defaults() {
        let table = schema_table(users_table());
        let mut ctx = FakeContext::new();

        let row = normalize_insert(&table, &Row::new().with("name", "x"), &mut ctx).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("role"), Some(&Value::Text("a".into())));

        let row = normalize_insert(&table, &Row::new().with("name", "y"), &mut ctx).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn insert_keeps_caller_values() {
        let table = schema_table(users_table());
        let mut ctx = FakeContext::new();

        let input = Row::new().with("id", 42i64).with("name", "x").with("role", "b");
        let row = normalize_insert(&table, &input, &mut ctx).unwrap();
        assert_eq!(row.get("id"), Some(&Value::Integer(42)));
        assert_eq!(row.get("role"), Some(&Value::Text("b".into())));
    }

    #[test]
    fn insert_rejects_missing_not_null() {
        let table = schema_table(users_table());
        let mut ctx = FakeContext::new();

        let err = normalize_insert(&table, &Row::new(), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotNullViolation { .. }));
        assert!(err.to_string().contains("users.name"));
    }

    #[test]
    fn insert_rejects_explicit_null_on_not_null() {
        let table = schema_table(users_table());
        let mut ctx = FakeContext::new();

        let input = Row::new().with("name", Value::Null);
        let err = normalize_insert(&table, &input, &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotNullViolation { .. }));
    }

    #[test]
    fn default_producer_wins_over_literal() {
        let table = schema_table(
            Table::new("t")
                .column(Column::integer("id").primary_key())
                .column(
                    Column::text("v")
                        .default_value("literal")
                        .default_fn(|| Value::Text("produced".into())),
                ),
        );
        let mut ctx = FakeContext::new();

        let row = normalize_insert(&table, &Row::new().with("id", 1i64), &mut ctx).unwrap();
        assert_eq!(row.get("v"), Some(&Value::Text("produced".into())));
    }

    fn fk_tables() -> (Table, Table) {
        let users = Table::new("users")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::text("name").not_null());
        let todos = Table::new("todos")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::integer("owner_id").references("users", "id"));
        let schema =
            Schema::build(SchemaOptions::new("test"), vec![users, todos]).unwrap();
        (
            schema.tables()[0].clone(),
            schema.tables()[1].clone(),
        )
    }

    #[test]
    fn foreign_key_must_exist() {
        let (_, todos) = fk_tables();

        let mut ctx = FakeContext::knowing("users", Key::Integer(1));
        let ok = normalize_insert(&todos, &Row::new().with("owner_id", 1i64), &mut ctx);
        assert!(ok.is_ok());

        let err =
            normalize_insert(&todos, &Row::new().with("owner_id", 2i64), &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn null_and_absent_foreign_keys_skip_check() {
        let (_, todos) = fk_tables();
        let mut ctx = FakeContext::new();

        assert!(normalize_insert(&todos, &Row::new(), &mut ctx).is_ok());
        assert!(
            normalize_insert(&todos, &Row::new().with("owner_id", Value::Null), &mut ctx).is_ok()
        );
    }

    #[test]
    fn unkeyable_foreign_key_value_is_a_violation() {
        let (_, todos) = fk_tables();
        let mut ctx = FakeContext::new();

        let err = normalize_insert(
            &todos,
            &Row::new().with("owner_id", Value::Float(1.5)),
            &mut ctx,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ForeignKeyViolation { .. }));
    }

    fn hooked_table() -> Table {
        schema_table(
            Table::new("t")
                .column(Column::integer("id").primary_key())
                .column(Column::text("name").not_null())
                .column(
                    Column::integer("updated_at")
                        .default_fn(|| Value::Integer(100))
                        .on_update(|prev| {
                            Value::Integer(prev.and_then(Value::as_integer).unwrap_or(0) + 1)
                        }),
                ),
        )
    }

    #[test]
    fn update_hook_runs_when_patch_omits_column() {
        let table = hooked_table();
        let mut ctx = FakeContext::new();

        let existing = Row::new()
            .with("id", 1i64)
            .with("name", "x")
            .with("updated_at", 100i64);
        let patch = Row::new().with("name", "y");

        let row = normalize_update(&table, &existing, &patch, &mut ctx).unwrap();
        assert_eq!(row.get("updated_at"), Some(&Value::Integer(101)));
        assert_eq!(row.get("name"), Some(&Value::Text("y".into())));
    }

    #[test]
    fn explicit_patch_suppresses_update_hook() {
        let table = hooked_table();
        let mut ctx = FakeContext::new();

        let existing = Row::new()
            .with("id", 1i64)
            .with("name", "x")
            .with("updated_at", 100i64);
        let patch = Row::new().with("updated_at", 555i64);

        let row = normalize_update(&table, &existing, &patch, &mut ctx).unwrap();
        assert_eq!(row.get("updated_at"), Some(&Value::Integer(555)));
    }

    #[test]
    fn update_recheck_catches_nulled_not_null() {
        let table = hooked_table();
        let mut ctx = FakeContext::new();

        let existing = Row::new().with("id", 1i64).with("name", "x");
        let patch = Row::new().with("name", Value::Null);

        let err = normalize_update(&table, &existing, &patch, &mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotNullViolation { .. }));
    }

    #[test]
    fn computed_index_field_is_materialized() {
        let table = schema_table(
            Table::new("t")
                .column(Column::integer("id").primary_key())
                .column(Column::text("name"))
                .index(Index::computed("by_len", "name_len", |row| {
                    Value::Integer(
                        row.get("name").and_then(Value::as_text).map_or(0, |s| s.len() as i64),
                    )
                })),
        );
        let mut ctx = FakeContext::new();

        let row = normalize_insert(
            &table,
            &Row::new().with("id", 1i64).with("name", "abc"),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(row.get("name_len"), Some(&Value::Integer(3)));
    }
}
