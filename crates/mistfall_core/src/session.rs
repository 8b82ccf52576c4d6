//! Transaction sessions.

use crate::backend::memory::{MemoryAccess, MemoryState};
use crate::backend::store::EngineAccess;
use crate::error::{CoreError, CoreResult};
use crate::ops;
use crate::query::SelectOptions;
use crate::schema::Schema;
use mistfall_store::{Row, StoreTransaction};
use std::collections::BTreeSet;

/// The transactional handle passed to a `transaction` body.
///
/// A session exposes the client's CRUD surface scoped to one transaction.
/// Writes made through the session are visible to its later reads and are
/// published (or rolled back) as one unit when the body returns. The
/// session is only valid inside the body; it cannot escape it.
///
/// On the engine backend, operations are restricted to the tables declared
/// in the `transaction` call; naming any other table fails with an
/// undeclared-table error. The memory backend treats the declared list as
/// informational.
pub struct Session<'a> {
    inner: SessionInner<'a>,
}

enum SessionInner<'a> {
    Memory {
        schema: &'a Schema,
        state: &'a mut MemoryState,
    },
    Engine {
        schema: &'a Schema,
        txn: &'a mut dyn StoreTransaction,
        declared: BTreeSet<String>,
    },
}

impl<'a> Session<'a> {
    pub(crate) fn memory(schema: &'a Schema, state: &'a mut MemoryState) -> Self {
        Self {
            inner: SessionInner::Memory { schema, state },
        }
    }

    pub(crate) fn engine(
        schema: &'a Schema,
        txn: &'a mut dyn StoreTransaction,
        declared: BTreeSet<String>,
    ) -> Self {
        Self {
            inner: SessionInner::Engine {
                schema,
                txn,
                declared,
            },
        }
    }

    /// Normalizes and inserts rows, returning the stored forms.
    pub fn insert(&mut self, table: &str, rows: Vec<Row>) -> CoreResult<Vec<Row>> {
        match &mut self.inner {
            SessionInner::Memory { schema, state } => {
                let table = schema.require_table(table)?;
                let mut access = MemoryAccess::new(schema, &mut **state);
                ops::insert(schema, &mut access, table, rows)
            }
            SessionInner::Engine {
                schema,
                txn,
                declared,
            } => {
                let table = ensure_declared(schema, declared, table)?;
                let mut access = EngineAccess::new(schema, &mut **txn);
                ops::insert(schema, &mut access, table, rows)
            }
        }
    }

    /// Inserts one row, returning the stored form.
    pub fn insert_one(&mut self, table: &str, row: Row) -> CoreResult<Row> {
        let mut rows = self.insert(table, vec![row])?;
        rows.pop()
            .ok_or_else(|| CoreError::schema("insert produced no row"))
    }

    /// Selects rows with filter, ordering, and pagination.
    pub fn select(&mut self, table: &str, options: SelectOptions) -> CoreResult<Vec<Row>> {
        match &mut self.inner {
            SessionInner::Memory { schema, state } => {
                let table = schema.require_table(table)?;
                let mut access = MemoryAccess::new(schema, &mut **state);
                ops::select(&mut access, table, &options)
            }
            SessionInner::Engine {
                schema,
                txn,
                declared,
            } => {
                let table = ensure_declared(schema, declared, table)?;
                let mut access = EngineAccess::new(schema, &mut **txn);
                ops::select(&mut access, table, &options)
            }
        }
    }

    /// Updates rows matching the predicate. Returns the number updated.
    pub fn update(
        &mut self,
        table: &str,
        predicate: impl Fn(&Row) -> bool,
        patch: Row,
    ) -> CoreResult<usize> {
        match &mut self.inner {
            SessionInner::Memory { schema, state } => {
                let table = schema.require_table(table)?;
                let mut access = MemoryAccess::new(schema, &mut **state);
                ops::update(schema, &mut access, table, &predicate, &patch)
            }
            SessionInner::Engine {
                schema,
                txn,
                declared,
            } => {
                let table = ensure_declared(schema, declared, table)?;
                let mut access = EngineAccess::new(schema, &mut **txn);
                ops::update(schema, &mut access, table, &predicate, &patch)
            }
        }
    }

    /// Deletes rows matching the predicate. Returns the number removed.
    pub fn delete(
        &mut self,
        table: &str,
        predicate: impl Fn(&Row) -> bool,
    ) -> CoreResult<usize> {
        match &mut self.inner {
            SessionInner::Memory { schema, state } => {
                let table = schema.require_table(table)?;
                let mut access = MemoryAccess::new(schema, &mut **state);
                ops::delete(schema, &mut access, table, &predicate)
            }
            SessionInner::Engine {
                schema,
                txn,
                declared,
            } => {
                let table = ensure_declared(schema, declared, table)?;
                let mut access = EngineAccess::new(schema, &mut **txn);
                ops::delete(schema, &mut access, table, &predicate)
            }
        }
    }
}

fn ensure_declared<'s>(
    schema: &'s Schema,
    declared: &BTreeSet<String>,
    table: &str,
) -> CoreResult<&'s crate::schema::Table> {
    let table = schema.require_table(table)?;
    if !declared.contains(table.name()) {
        return Err(CoreError::UndeclaredTable {
            table: table.name().to_string(),
        });
    }
    Ok(table)
}
