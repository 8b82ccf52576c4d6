//! Engine-driven backend.
//!
//! Drives a [`StoreEngine`] through its versioned-open and transactional
//! protocol. Each public write opens one engine transaction whose store set
//! covers everything the operation may touch — the target store, `__seq`,
//! the stores its foreign keys point at, and (for deletes) the transitive
//! closure of stores that point back — so identity allocation and
//! referential checks land atomically with the mutation. Rollback is the
//! engine's native abort.

use crate::backend::SEQ_STORE;
use crate::error::{CoreError, CoreResult};
use crate::ops::{self, primary_key_of, TableAccess};
use crate::query::{evaluate, SelectOptions};
use crate::schema::{Schema, Table};
use crate::session::Session;
use crate::upgrade::UpgradePlanner;
use mistfall_store::{
    Key, Row, StoreDatabase, StoreEngine, StoreError, StoreTransaction, TransactionMode, Value,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The engine-driven ("persistent") backend.
pub(crate) struct StoreBackend {
    schema: Arc<Schema>,
    db: Box<dyn StoreDatabase>,
}

impl StoreBackend {
    /// Opens the named database, running the upgrade planner if the stored
    /// version is behind the schema's.
    pub(crate) fn open(
        schema: Arc<Schema>,
        engine: &dyn StoreEngine,
        db_name: &str,
    ) -> CoreResult<Self> {
        let planner = UpgradePlanner::new(&schema);
        let db = engine.open(db_name, schema.version(), &mut |ctx| planner.apply(ctx))?;
        tracing::debug!(db = db_name, version = schema.version(), "database opened");
        Ok(Self { schema, db })
    }

    pub(crate) fn insert(&self, table: &Table, rows: Vec<Row>) -> CoreResult<Vec<Row>> {
        let stores = self.write_store_set([table], false);
        self.with_write_txn(&stores, |access| {
            ops::insert(&self.schema, access, table, rows)
        })
    }

    pub(crate) fn select(&self, table: &Table, options: &SelectOptions) -> CoreResult<Vec<Row>> {
        let store = self.schema.storage_name(table.name());
        let txn = self
            .db
            .transaction(&[store.as_str()], TransactionMode::ReadOnly)?;
        let rows = txn.scan(&store)?;
        txn.abort();
        Ok(evaluate(rows, options))
    }

    pub(crate) fn update(
        &self,
        table: &Table,
        predicate: &dyn Fn(&Row) -> bool,
        patch: &Row,
    ) -> CoreResult<usize> {
        let stores = self.write_store_set([table], false);
        self.with_write_txn(&stores, |access| {
            ops::update(&self.schema, access, table, predicate, patch)
        })
    }

    pub(crate) fn delete(
        &self,
        table: &Table,
        predicate: &dyn Fn(&Row) -> bool,
    ) -> CoreResult<usize> {
        let stores = self.write_store_set([table], true);
        self.with_write_txn(&stores, |access| {
            ops::delete(&self.schema, access, table, predicate)
        })
    }

    /// Runs `f` in one engine transaction scoped to the declared tables.
    pub(crate) fn transaction<T>(
        &self,
        tables: &[&Table],
        f: impl FnOnce(&mut Session<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let stores = self.write_store_set(tables.iter().copied(), true);
        let declared: BTreeSet<String> =
            tables.iter().map(|t| t.name().to_string()).collect();

        let refs: Vec<&str> = stores.iter().map(String::as_str).collect();
        let mut txn = self.db.transaction(&refs, TransactionMode::ReadWrite)?;

        let mut session = Session::engine(&self.schema, txn.as_mut(), declared);
        let result = f(&mut session);
        drop(session);

        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(error) => {
                txn.abort();
                tracing::debug!(error = %error, "engine transaction aborted");
                Err(error)
            }
        }
    }

    pub(crate) fn close(&self) {
        self.db.close();
    }

    /// The store set for a write touching `tables`: their own stores,
    /// `__seq`, every store their foreign keys point at, and — when
    /// deletes are possible — the transitive closure of stores pointing
    /// back at them (cascades can fan out).
    fn write_store_set<'t>(
        &self,
        tables: impl IntoIterator<Item = &'t Table>,
        with_dependents: bool,
    ) -> Vec<String> {
        let mut stores = BTreeSet::new();
        stores.insert(SEQ_STORE.to_string());

        let mut pending: Vec<String> = Vec::new();
        for table in tables {
            stores.insert(self.schema.storage_name(table.name()));
            for column in table.columns() {
                if let Some(fk) = column.foreign_key() {
                    stores.insert(self.schema.storage_name(&fk.target_table));
                }
            }
            pending.push(table.name().to_string());
        }

        if with_dependents {
            let mut seen = BTreeSet::new();
            while let Some(name) = pending.pop() {
                if !seen.insert(name.clone()) {
                    continue;
                }
                for dependent in self.schema.dependents(&name) {
                    stores.insert(self.schema.storage_name(&dependent.table));
                    pending.push(dependent.table.clone());
                }
            }
        }

        stores.into_iter().collect()
    }

    fn with_write_txn<T>(
        &self,
        stores: &[String],
        f: impl FnOnce(&mut EngineAccess<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let refs: Vec<&str> = stores.iter().map(String::as_str).collect();
        let mut txn = self.db.transaction(&refs, TransactionMode::ReadWrite)?;

        let result = {
            let mut access = EngineAccess::new(&self.schema, txn.as_mut());
            f(&mut access)
        };

        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(error) => {
                txn.abort();
                Err(error)
            }
        }
    }
}

/// [`TableAccess`] over one engine transaction.
pub(crate) struct EngineAccess<'a> {
    schema: &'a Schema,
    txn: &'a mut dyn StoreTransaction,
}

impl<'a> EngineAccess<'a> {
    pub(crate) fn new(schema: &'a Schema, txn: &'a mut dyn StoreTransaction) -> Self {
        Self { schema, txn }
    }
}

impl TableAccess for EngineAccess<'_> {
    fn scan(&mut self, table: &Table) -> CoreResult<Vec<(Key, Row)>> {
        let store = self.schema.storage_name(table.name());
        self.txn
            .scan(&store)?
            .into_iter()
            .map(|row| Ok((primary_key_of(table, &row)?, row)))
            .collect()
    }

    fn get(&mut self, table: &Table, key: &Key) -> CoreResult<Option<Row>> {
        let store = self.schema.storage_name(table.name());
        Ok(self.txn.get(&store, key)?)
    }

    fn insert(&mut self, table: &Table, row: Row) -> CoreResult<Key> {
        let store = self.schema.storage_name(table.name());
        match self.txn.insert(&store, row) {
            Ok(key) => Ok(key),
            Err(StoreError::KeyExists { key, .. }) => Err(CoreError::PrimaryKeyViolation {
                table: table.name().to_string(),
                key,
            }),
            Err(other) => Err(other.into()),
        }
    }

    fn replace(&mut self, table: &Table, row: Row) -> CoreResult<()> {
        let store = self.schema.storage_name(table.name());
        self.txn.put(&store, row)?;
        Ok(())
    }

    fn remove(&mut self, table: &Table, key: &Key) -> CoreResult<bool> {
        let store = self.schema.storage_name(table.name());
        Ok(self.txn.delete(&store, key)?)
    }

    /// Reads the table's counter from `__seq`, writes back the increment,
    /// and returns it — all inside the operation's own transaction, so the
    /// allocation commits or rolls back with the row.
    fn allocate_identity(&mut self, table: &Table) -> CoreResult<i64> {
        let counter_key = Key::Text(self.schema.storage_name(table.name()));
        let current = self
            .txn
            .get(SEQ_STORE, &counter_key)?
            .and_then(|row| row.get("value").and_then(Value::as_integer))
            .unwrap_or(0);
        let next = current + 1;

        let record = Row::new()
            .with("table", counter_key.to_value())
            .with("value", next);
        self.txn.put(SEQ_STORE, record)?;
        Ok(next)
    }
}
