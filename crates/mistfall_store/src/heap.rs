//! In-process reference engine.

use crate::engine::{
    IndexSpec, StoreDatabase, StoreEngine, StoreTransaction, TransactionMode, UpgradeContext,
};
use crate::error::{StoreError, StoreResult};
use crate::value::{Key, Row};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-process object-store engine.
///
/// `HeapEngine` keeps every database in memory for the engine's lifetime,
/// so closing and reopening a connection within one process observes the
/// same data — the behavior a host-provided engine would give across page
/// loads. Cloning the engine clones the handle, not the data.
///
/// Transactions take a copy-on-begin snapshot of their declared stores and
/// publish it wholesale at commit. Each database has a single writer slot:
/// beginning a `ReadWrite` transaction blocks until the previous write
/// transaction commits, aborts, or is dropped, so a later writer always
/// snapshots the earlier writer's published state. Upgrades take the same
/// slot. Read-only transactions snapshot the committed state and never
/// block.
///
/// # Example
///
/// ```rust
/// use mistfall_store::{HeapEngine, Row, StoreEngine, TransactionMode};
///
/// let engine = HeapEngine::new();
/// let db = engine
///     .open("app", 1, &mut |ctx| ctx.create_store("items", "id"))
///     .unwrap();
///
/// let mut txn = db.transaction(&["items"], TransactionMode::ReadWrite).unwrap();
/// txn.insert("items", Row::new().with("id", 1i64)).unwrap();
/// txn.commit().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeapEngine {
    registry: Arc<RwLock<HashMap<String, Arc<SharedDb>>>>,
}

#[derive(Debug)]
struct SharedDb {
    name: String,
    state: RwLock<DbState>,
    /// True while a write transaction (or an upgrade) holds the database's
    /// single writer slot.
    writing: Mutex<bool>,
    writer_released: Condvar,
}

impl SharedDb {
    /// Takes the writer slot, blocking while another writer holds it.
    fn acquire_write(&self) {
        let mut writing = self.writing.lock();
        while *writing {
            self.writer_released.wait(&mut writing);
        }
        *writing = true;
    }

    fn release_write(&self) {
        let mut writing = self.writing.lock();
        *writing = false;
        self.writer_released.notify_one();
    }
}

#[derive(Debug, Clone, Default)]
struct DbState {
    version: u32,
    stores: BTreeMap<String, StoreState>,
}

#[derive(Debug, Clone)]
struct StoreState {
    key_path: String,
    indexes: BTreeMap<String, IndexSpec>,
    records: BTreeMap<Key, Row>,
}

impl StoreState {
    fn new(key_path: &str) -> Self {
        Self {
            key_path: key_path.to_string(),
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    fn extract_key(&self, store: &str, row: &Row) -> StoreResult<Key> {
        let value = row.get(&self.key_path).ok_or_else(|| StoreError::MissingKeyPath {
            store: store.to_string(),
            key_path: self.key_path.clone(),
        })?;
        Key::try_from(value)
    }

    /// Rejects the write if a unique index would end up with a duplicate
    /// value. Records that do not carry the indexed field are skipped, and
    /// the record stored under `key` itself is ignored (it is the one being
    /// replaced).
    fn check_unique(&self, store: &str, row: &Row, key: &Key) -> StoreResult<()> {
        for index in self.indexes.values().filter(|i| i.unique) {
            let Some(candidate) = row.get(&index.key_path) else {
                continue;
            };
            for (existing_key, existing) in &self.records {
                if existing_key == key {
                    continue;
                }
                if existing.get(&index.key_path) == Some(candidate) {
                    return Err(StoreError::UniqueIndexViolation {
                        store: store.to_string(),
                        index: index.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl HeapEngine {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn shared(&self, name: &str) -> Arc<SharedDb> {
        let mut registry = self.registry.write();
        registry
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(SharedDb {
                    name: name.to_string(),
                    state: RwLock::new(DbState::default()),
                    writing: Mutex::new(false),
                    writer_released: Condvar::new(),
                })
            })
            .clone()
    }
}

impl StoreEngine for HeapEngine {
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &mut dyn FnMut(&mut dyn UpgradeContext) -> StoreResult<()>,
    ) -> StoreResult<Box<dyn StoreDatabase>> {
        let shared = self.shared(name);

        // The version check and upgrade occupy the writer slot: a version
        // bump swaps the whole state and must not interleave with a write
        // transaction's publish.
        shared.acquire_write();
        let upgraded = (|| {
            let mut state = shared.state.write();
            if state.version > version {
                return Err(StoreError::VersionConflict {
                    name: name.to_string(),
                    stored: state.version,
                    requested: version,
                });
            }
            if state.version < version {
                // Upgrades run against a working copy so a failed callback
                // leaves the stored state untouched.
                let mut working = state.clone();
                let old_version = working.version;
                working.version = version;
                let mut ctx = HeapUpgradeContext {
                    old_version,
                    new_version: version,
                    state: &mut working,
                };
                upgrade(&mut ctx)?;
                *state = working;
            }
            Ok(())
        })();
        shared.release_write();
        upgraded?;

        Ok(Box::new(HeapDatabase {
            shared,
            version,
            open: AtomicBool::new(true),
        }))
    }

    fn delete_database(&self, name: &str) -> StoreResult<()> {
        self.registry.write().remove(name);
        Ok(())
    }
}

struct HeapUpgradeContext<'a> {
    old_version: u32,
    new_version: u32,
    state: &'a mut DbState,
}

impl HeapUpgradeContext<'_> {
    fn store(&self, name: &str) -> StoreResult<&StoreState> {
        self.state
            .stores
            .get(name)
            .ok_or_else(|| StoreError::unknown_store(name))
    }
}

impl UpgradeContext for HeapUpgradeContext<'_> {
    fn old_version(&self) -> u32 {
        self.old_version
    }

    fn new_version(&self) -> u32 {
        self.new_version
    }

    fn has_store(&self, name: &str) -> bool {
        self.state.stores.contains_key(name)
    }

    fn create_store(&mut self, name: &str, key_path: &str) -> StoreResult<()> {
        if self.state.stores.contains_key(name) {
            return Err(StoreError::upgrade_failed(format!(
                "object store already exists: {name}"
            )));
        }
        self.state
            .stores
            .insert(name.to_string(), StoreState::new(key_path));
        Ok(())
    }

    fn has_index(&self, store: &str, index: &str) -> StoreResult<bool> {
        Ok(self.store(store)?.indexes.contains_key(index))
    }

    fn create_index(&mut self, store: &str, index: IndexSpec) -> StoreResult<()> {
        let existing = self
            .state
            .stores
            .get(store)
            .ok_or_else(|| StoreError::unknown_store(store))?;
        if existing.indexes.contains_key(&index.name) {
            return Err(StoreError::upgrade_failed(format!(
                "index already exists: {store}.{}",
                index.name
            )));
        }
        if index.unique {
            // A unique index over existing records must start out unique.
            let mut seen = Vec::new();
            for row in existing.records.values() {
                let Some(value) = row.get(&index.key_path) else {
                    continue;
                };
                if seen.contains(&value) {
                    return Err(StoreError::UniqueIndexViolation {
                        store: store.to_string(),
                        index: index.name.clone(),
                    });
                }
                seen.push(value);
            }
        }
        let state = self
            .state
            .stores
            .get_mut(store)
            .ok_or_else(|| StoreError::unknown_store(store))?;
        state.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    fn get(&self, store: &str, key: &Key) -> StoreResult<Option<Row>> {
        Ok(self.store(store)?.records.get(key).cloned())
    }

    fn put(&mut self, store: &str, row: Row) -> StoreResult<Key> {
        let state = self
            .state
            .stores
            .get_mut(store)
            .ok_or_else(|| StoreError::unknown_store(store))?;
        let key = state.extract_key(store, &row)?;
        state.check_unique(store, &row, &key)?;
        state.records.insert(key.clone(), row);
        Ok(key)
    }
}

struct HeapDatabase {
    shared: Arc<SharedDb>,
    version: u32,
    open: AtomicBool,
}

impl StoreDatabase for HeapDatabase {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> StoreResult<Box<dyn StoreTransaction>> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(StoreError::DatabaseClosed);
        }

        // A write transaction owns the database's writer slot for its whole
        // lifetime, so the snapshot below is taken only after any earlier
        // writer has published or discarded.
        if mode == TransactionMode::ReadWrite {
            self.shared.acquire_write();
        }
        let working = match self.snapshot_stores(stores) {
            Ok(working) => working,
            Err(error) => {
                if mode == TransactionMode::ReadWrite {
                    self.shared.release_write();
                }
                return Err(error);
            }
        };

        Ok(Box::new(HeapTransaction {
            shared: self.shared.clone(),
            mode,
            working,
        }))
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl HeapDatabase {
    fn snapshot_stores(&self, stores: &[&str]) -> StoreResult<BTreeMap<String, StoreState>> {
        let state = self.shared.state.read();
        let mut working = BTreeMap::new();
        for name in stores {
            let store = state
                .stores
                .get(*name)
                .ok_or_else(|| StoreError::unknown_store(*name))?;
            working.insert((*name).to_string(), store.clone());
        }
        Ok(working)
    }
}

struct HeapTransaction {
    shared: Arc<SharedDb>,
    mode: TransactionMode,
    working: BTreeMap<String, StoreState>,
}

impl HeapTransaction {
    fn store(&self, name: &str) -> StoreResult<&StoreState> {
        self.working.get(name).ok_or_else(|| StoreError::StoreOutOfScope {
            name: name.to_string(),
        })
    }

    fn store_mut(&mut self, name: &str) -> StoreResult<&mut StoreState> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }
        self.working.get_mut(name).ok_or_else(|| StoreError::StoreOutOfScope {
            name: name.to_string(),
        })
    }
}

impl StoreTransaction for HeapTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn get(&self, store: &str, key: &Key) -> StoreResult<Option<Row>> {
        Ok(self.store(store)?.records.get(key).cloned())
    }

    fn scan(&self, store: &str) -> StoreResult<Vec<Row>> {
        Ok(self.store(store)?.records.values().cloned().collect())
    }

    fn insert(&mut self, store: &str, row: Row) -> StoreResult<Key> {
        let state = self.store_mut(store)?;
        let key = state.extract_key(store, &row)?;
        if state.records.contains_key(&key) {
            return Err(StoreError::KeyExists {
                store: store.to_string(),
                key,
            });
        }
        state.check_unique(store, &row, &key)?;
        state.records.insert(key.clone(), row);
        Ok(key)
    }

    fn put(&mut self, store: &str, row: Row) -> StoreResult<Key> {
        let state = self.store_mut(store)?;
        let key = state.extract_key(store, &row)?;
        state.check_unique(store, &row, &key)?;
        state.records.insert(key.clone(), row);
        Ok(key)
    }

    fn delete(&mut self, store: &str, key: &Key) -> StoreResult<bool> {
        Ok(self.store_mut(store)?.records.remove(key).is_some())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Ok(());
        }
        let working = std::mem::take(&mut self.working);
        let mut state = self.shared.state.write();
        for (name, store) in working {
            state.stores.insert(name, store);
        }
        // Dropping `self` releases the writer slot after the publish.
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // The working copy is dropped; `Drop` releases the writer slot.
    }
}

impl Drop for HeapTransaction {
    fn drop(&mut self) {
        if self.mode == TransactionMode::ReadWrite {
            self.shared.release_write();
        }
    }
}
