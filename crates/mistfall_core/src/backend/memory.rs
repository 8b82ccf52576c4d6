//! In-process memory backend.
//!
//! Rows live in ordered maps keyed by primary key, one per table, next to
//! per-table sequence counters. Explicit transactions snapshot the whole
//! state on begin and restore it wholesale on error; single operations
//! mutate in place (the delete planner in [`crate::ops`] already rejects
//! before touching anything).

use crate::error::CoreResult;
use crate::ops::{self, primary_key_of, TableAccess};
use crate::query::SelectOptions;
use crate::schema::{Schema, Table};
use crate::session::Session;
use mistfall_store::{Key, Row};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Whole-backend state: row stores and sequence counters.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    stores: BTreeMap<String, BTreeMap<Key, Row>>,
    sequences: BTreeMap<String, i64>,
}

/// The memory backend.
pub(crate) struct MemoryBackend {
    schema: Arc<Schema>,
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub(crate) fn new(schema: Arc<Schema>) -> Self {
        let mut state = MemoryState::default();
        for table in schema.tables() {
            state
                .stores
                .insert(schema.storage_name(table.name()), BTreeMap::new());
        }
        Self {
            schema,
            state: RwLock::new(state),
        }
    }

    pub(crate) fn insert(&self, table: &Table, rows: Vec<Row>) -> CoreResult<Vec<Row>> {
        let mut state = self.state.write();
        let mut access = MemoryAccess::new(&self.schema, &mut state);
        ops::insert(&self.schema, &mut access, table, rows)
    }

    pub(crate) fn select(&self, table: &Table, options: &SelectOptions) -> CoreResult<Vec<Row>> {
        let mut state = self.state.write();
        let mut access = MemoryAccess::new(&self.schema, &mut state);
        ops::select(&mut access, table, options)
    }

    pub(crate) fn update(
        &self,
        table: &Table,
        predicate: &dyn Fn(&Row) -> bool,
        patch: &Row,
    ) -> CoreResult<usize> {
        let mut state = self.state.write();
        let mut access = MemoryAccess::new(&self.schema, &mut state);
        ops::update(&self.schema, &mut access, table, predicate, patch)
    }

    pub(crate) fn delete(
        &self,
        table: &Table,
        predicate: &dyn Fn(&Row) -> bool,
    ) -> CoreResult<usize> {
        let mut state = self.state.write();
        let mut access = MemoryAccess::new(&self.schema, &mut state);
        ops::delete(&self.schema, &mut access, table, predicate)
    }

    /// Runs `f` in an explicit transaction. The state lock is held for the
    /// whole session; on error the snapshot taken at begin is restored,
    /// sequence counters included.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Session<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut state = self.state.write();
        let snapshot = state.clone();

        let mut session = Session::memory(&self.schema, &mut state);
        let result = f(&mut session);
        drop(session);

        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                *state = snapshot;
                tracing::debug!(error = %error, "memory transaction rolled back");
                Err(error)
            }
        }
    }
}

/// [`TableAccess`] over the memory state.
pub(crate) struct MemoryAccess<'a> {
    schema: &'a Schema,
    state: &'a mut MemoryState,
}

impl<'a> MemoryAccess<'a> {
    pub(crate) fn new(schema: &'a Schema, state: &'a mut MemoryState) -> Self {
        Self { schema, state }
    }

    fn store_mut(&mut self, table: &Table) -> &mut BTreeMap<Key, Row> {
        self.state
            .stores
            .entry(self.schema.storage_name(table.name()))
            .or_default()
    }
}

impl TableAccess for MemoryAccess<'_> {
    fn scan(&mut self, table: &Table) -> CoreResult<Vec<(Key, Row)>> {
        let name = self.schema.storage_name(table.name());
        Ok(self
            .state
            .stores
            .get(&name)
            .map(|store| {
                store
                    .iter()
                    .map(|(key, row)| (key.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&mut self, table: &Table, key: &Key) -> CoreResult<Option<Row>> {
        let name = self.schema.storage_name(table.name());
        Ok(self
            .state
            .stores
            .get(&name)
            .and_then(|store| store.get(key).cloned()))
    }

    fn insert(&mut self, table: &Table, row: Row) -> CoreResult<Key> {
        let key = primary_key_of(table, &row)?;
        let store = self.store_mut(table);
        if store.contains_key(&key) {
            return Err(crate::error::CoreError::PrimaryKeyViolation {
                table: table.name().to_string(),
                key,
            });
        }
        store.insert(key.clone(), row);
        Ok(key)
    }

    fn replace(&mut self, table: &Table, row: Row) -> CoreResult<()> {
        let key = primary_key_of(table, &row)?;
        self.store_mut(table).insert(key, row);
        Ok(())
    }

    fn remove(&mut self, table: &Table, key: &Key) -> CoreResult<bool> {
        Ok(self.store_mut(table).remove(key).is_some())
    }

    fn allocate_identity(&mut self, table: &Table) -> CoreResult<i64> {
        let name = self.schema.storage_name(table.name());
        let counter = self.state.sequences.entry(name).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
