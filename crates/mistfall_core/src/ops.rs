//! Backend-shared CRUD execution.
//!
//! Both backends expose row storage to this module through [`TableAccess`];
//! everything relational — normalization, primary-key movement on update,
//! restrict/cascade delete planning — lives here once.

use crate::error::{CoreError, CoreResult};
use crate::normalize::{normalize_insert, normalize_update, NormalizationContext};
use crate::query::{evaluate, SelectOptions};
use crate::schema::{OnDelete, Schema, Table};
use mistfall_store::{Key, Row, Value};
use std::collections::BTreeSet;

/// Row storage operations a backend supplies for one unit of work (an
/// implicit per-operation transaction or an explicit session).
pub(crate) trait TableAccess {
    /// Every row of the table, keyed, in ascending key order.
    fn scan(&mut self, table: &Table) -> CoreResult<Vec<(Key, Row)>>;

    /// The row stored under `key`, if any.
    fn get(&mut self, table: &Table, key: &Key) -> CoreResult<Option<Row>>;

    /// Stores a new row, failing with a primary-key violation if its key is
    /// taken. Returns the key.
    fn insert(&mut self, table: &Table, row: Row) -> CoreResult<Key>;

    /// Stores a row, replacing any previous row under the same key.
    fn replace(&mut self, table: &Table, row: Row) -> CoreResult<()>;

    /// Removes the row stored under `key`. Returns whether it existed.
    fn remove(&mut self, table: &Table, key: &Key) -> CoreResult<bool>;

    /// Allocates the next identity value for the table.
    fn allocate_identity(&mut self, table: &Table) -> CoreResult<i64>;
}

/// Extracts a row's primary key.
pub(crate) fn primary_key_of(table: &Table, row: &Row) -> CoreResult<Key> {
    let pk = table.primary_key().name();
    let value = row
        .get(pk)
        .ok_or_else(|| CoreError::not_null(table.name(), pk))?;
    Ok(Key::try_from(value)?)
}

/// [`NormalizationContext`] over any [`TableAccess`].
struct PipelineContext<'a, A: TableAccess> {
    schema: &'a Schema,
    access: &'a mut A,
}

impl<A: TableAccess> NormalizationContext for PipelineContext<'_, A> {
    fn allocate_identity(&mut self, table: &Table) -> CoreResult<Value> {
        Ok(Value::Integer(self.access.allocate_identity(table)?))
    }

    fn reference_exists(&mut self, target_table: &str, key: &Key) -> CoreResult<bool> {
        let table = self.schema.require_table(target_table)?;
        Ok(self.access.get(table, key)?.is_some())
    }
}

/// Normalizes and stores each row, returning the stored forms.
pub(crate) fn insert<A: TableAccess>(
    schema: &Schema,
    access: &mut A,
    table: &Table,
    rows: Vec<Row>,
) -> CoreResult<Vec<Row>> {
    let mut inserted = Vec::with_capacity(rows.len());
    for row in rows {
        let normalized = {
            let mut ctx = PipelineContext {
                schema,
                access: &mut *access,
            };
            normalize_insert(table, &row, &mut ctx)?
        };
        access.insert(table, normalized.clone())?;
        inserted.push(normalized);
    }
    Ok(inserted)
}

/// Scans the table and applies the select options.
pub(crate) fn select<A: TableAccess>(
    access: &mut A,
    table: &Table,
    options: &SelectOptions,
) -> CoreResult<Vec<Row>> {
    let rows = access
        .scan(table)?
        .into_iter()
        .map(|(_, row)| row)
        .collect();
    Ok(evaluate(rows, options))
}

/// Updates every row matching the predicate with the normalized patch.
/// Returns the number of rows updated.
pub(crate) fn update<A: TableAccess>(
    schema: &Schema,
    access: &mut A,
    table: &Table,
    predicate: &dyn Fn(&Row) -> bool,
    patch: &Row,
) -> CoreResult<usize> {
    let candidates: Vec<(Key, Row)> = access
        .scan(table)?
        .into_iter()
        .filter(|(_, row)| predicate(row))
        .collect();

    let mut updated = 0usize;
    for (key, existing) in candidates {
        let normalized = {
            let mut ctx = PipelineContext {
                schema,
                access: &mut *access,
            };
            normalize_update(table, &existing, patch, &mut ctx)?
        };

        // A patch may move the primary key; the row then migrates to the
        // new key, which must be free.
        let new_key = primary_key_of(table, &normalized)?;
        if new_key != key {
            if access.get(table, &new_key)?.is_some() {
                return Err(CoreError::PrimaryKeyViolation {
                    table: table.name().to_string(),
                    key: new_key,
                });
            }
            access.remove(table, &key)?;
        }
        access.replace(table, normalized)?;
        updated += 1;
    }
    Ok(updated)
}

/// Deletes every row matching the predicate, honoring restrict and cascade
/// reference modes. Returns the number of target-table rows removed.
pub(crate) fn delete<A: TableAccess>(
    schema: &Schema,
    access: &mut A,
    table: &Table,
    predicate: &dyn Fn(&Row) -> bool,
) -> CoreResult<usize> {
    let candidates: Vec<Key> = access
        .scan(table)?
        .into_iter()
        .filter(|(_, row)| predicate(row))
        .map(|(key, _)| key)
        .collect();

    // Plan first, remove second: a restrict violation anywhere must leave
    // the stores untouched even outside an explicit transaction.
    let mut plan = Vec::new();
    let mut visited = BTreeSet::new();
    for key in &candidates {
        plan_removal(schema, access, table, key, &mut plan, &mut visited)?;
    }

    for (table_name, key) in &plan {
        let planned = schema.require_table(table_name)?;
        access.remove(planned, key)?;
    }
    Ok(candidates.len())
}

/// Post-order walk of the reverse dependency map: dependents are planned
/// (and thus later removed) before the rows they point at.
fn plan_removal<A: TableAccess>(
    schema: &Schema,
    access: &mut A,
    table: &Table,
    key: &Key,
    plan: &mut Vec<(String, Key)>,
    visited: &mut BTreeSet<(String, Key)>,
) -> CoreResult<()> {
    if !visited.insert((table.name().to_string(), key.clone())) {
        return Ok(());
    }

    let key_value = key.to_value();
    for dependent in schema.dependents(table.name()) {
        let dependent_table = schema.require_table(&dependent.table)?;
        let matches: Vec<Key> = access
            .scan(dependent_table)?
            .into_iter()
            .filter(|(_, row)| row.get(&dependent.column) == Some(&key_value))
            .map(|(k, _)| k)
            .collect();
        if matches.is_empty() {
            continue;
        }

        match dependent.on_delete {
            OnDelete::Restrict => {
                return Err(CoreError::RestrictedDelete {
                    table: table.name().to_string(),
                    key: key.clone(),
                    dependent_table: dependent.table.clone(),
                    dependent_column: dependent.column.clone(),
                });
            }
            OnDelete::Cascade => {
                for dependent_key in matches {
                    plan_removal(schema, access, dependent_table, &dependent_key, plan, visited)?;
                }
            }
        }
    }

    plan.push((table.name().to_string(), key.clone()));
    Ok(())
}
