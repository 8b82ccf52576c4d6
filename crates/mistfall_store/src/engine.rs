//! Store engine trait definitions.

use crate::error::StoreResult;
use crate::value::{Key, Row};
use serde::{Deserialize, Serialize};

/// Access mode for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; writes are rejected.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Declaration of an index on an object store.
///
/// The `key_path` names the record field whose value is indexed. A `unique`
/// index rejects writes that would duplicate an indexed value; records that
/// do not carry the field are not indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within its store.
    pub name: String,
    /// Record field the index covers.
    pub key_path: String,
    /// Whether indexed values must be unique across the store.
    pub unique: bool,
}

/// A versioned object-store engine.
///
/// An engine owns a set of named databases. Opening a database at a version
/// above the stored one runs the caller's upgrade callback before the
/// connection is returned; opening below the stored version fails. A fresh
/// database starts at version 0, so any first open at version ≥ 1 upgrades.
///
/// # Invariants
///
/// - The upgrade callback runs at most once per `open`, and its effects are
///   visible only if it returns `Ok`.
/// - Databases live for the engine's lifetime; `close` on a connection does
///   not discard data.
pub trait StoreEngine: Send + Sync {
    /// Opens (creating or upgrading as needed) the named database.
    ///
    /// # Errors
    ///
    /// Returns an error if `version` is below the stored version or if the
    /// upgrade callback fails.
    fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &mut dyn FnMut(&mut dyn UpgradeContext) -> StoreResult<()>,
    ) -> StoreResult<Box<dyn StoreDatabase>>;

    /// Deletes the named database and all of its stores.
    fn delete_database(&self, name: &str) -> StoreResult<()>;
}

/// An open connection to one database.
pub trait StoreDatabase: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version this connection was opened at.
    fn version(&self) -> u32;

    /// Begins a transaction over an explicit store set.
    ///
    /// Only the named stores are reachable from the transaction. Changes
    /// become visible to other transactions at `commit`; dropping an
    /// uncommitted transaction aborts it.
    ///
    /// `ReadWrite` transactions are serialized per database: this call
    /// blocks while another write transaction is active, and returns only
    /// once that writer has committed, aborted, or been dropped. A writer
    /// therefore always observes the previous writer's published state and
    /// can never discard it. `ReadOnly` transactions snapshot the committed
    /// state and run concurrently with anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or a named store does
    /// not exist.
    fn transaction(
        &self,
        stores: &[&str],
        mode: TransactionMode,
    ) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Closes the connection. Later transactions fail; stored data remains.
    fn close(&self);
}

/// An active transaction.
pub trait StoreTransaction: Send {
    /// The mode this transaction was opened with.
    fn mode(&self) -> TransactionMode;

    /// Reads the record stored under `key`.
    fn get(&self, store: &str, key: &Key) -> StoreResult<Option<Row>>;

    /// Returns every record of the store in ascending key order.
    fn scan(&self, store: &str) -> StoreResult<Vec<Row>>;

    /// Inserts a record, failing if its key already exists.
    ///
    /// The key is extracted from the record via the store's key path.
    /// Returns the extracted key.
    fn insert(&mut self, store: &str, row: Row) -> StoreResult<Key>;

    /// Inserts or replaces a record. Returns the extracted key.
    fn put(&mut self, store: &str, row: Row) -> StoreResult<Key>;

    /// Deletes the record stored under `key`. Returns whether it existed.
    fn delete(&mut self, store: &str, key: &Key) -> StoreResult<bool>;

    /// Commits the transaction, publishing its writes.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Aborts the transaction, discarding its writes.
    fn abort(self: Box<Self>);
}

/// Handle passed to the upgrade callback during a versioned open.
///
/// The context allows structural changes (stores, indexes) and record
/// writes; everything it does takes effect atomically with the version
/// bump when the callback returns `Ok`.
pub trait UpgradeContext {
    /// The version on record before this open (0 for a fresh database).
    fn old_version(&self) -> u32;

    /// The version this open is upgrading to.
    fn new_version(&self) -> u32;

    /// Whether the named store exists.
    fn has_store(&self, name: &str) -> bool;

    /// Creates an object store keyed by `key_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store already exists.
    fn create_store(&mut self, name: &str, key_path: &str) -> StoreResult<()>;

    /// Whether the named index exists on the store.
    fn has_index(&self, store: &str, index: &str) -> StoreResult<bool>;

    /// Creates an index on an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unknown, the index already exists,
    /// or a unique index is created over records that already collide.
    fn create_index(&mut self, store: &str, index: IndexSpec) -> StoreResult<()>;

    /// Reads a record from a store.
    fn get(&self, store: &str, key: &Key) -> StoreResult<Option<Row>>;

    /// Inserts or replaces a record. Returns the extracted key.
    fn put(&mut self, store: &str, row: Row) -> StoreResult<Key>;
}
