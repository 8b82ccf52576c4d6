//! Error types for the store engine.

use crate::value::Key;
use thiserror::Error;

/// Result type for store engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named object store does not exist.
    #[error("unknown object store: {name}")]
    UnknownStore {
        /// Name of the missing store.
        name: String,
    },

    /// The named store is not part of the current transaction's store set.
    #[error("object store {name} is not in this transaction's scope")]
    StoreOutOfScope {
        /// Name of the out-of-scope store.
        name: String,
    },

    /// An insert collided with an existing key.
    #[error("key {key} already exists in object store {store}")]
    KeyExists {
        /// Store where the collision occurred.
        store: String,
        /// The colliding key.
        key: Key,
    },

    /// A value could not be used as a key.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the rejected value.
        message: String,
    },

    /// A record is missing the store's key path field.
    #[error("record is missing key path {key_path} for object store {store}")]
    MissingKeyPath {
        /// Store the record was written to.
        store: String,
        /// The store's key path.
        key_path: String,
    },

    /// A write violated a unique index.
    #[error("unique index violation on {store}.{index}")]
    UniqueIndexViolation {
        /// Store carrying the index.
        store: String,
        /// Name of the violated index.
        index: String,
    },

    /// An open requested a version older than the stored one.
    #[error("database {name} is at version {stored}, cannot open at version {requested}")]
    VersionConflict {
        /// Database name.
        name: String,
        /// Version currently on record.
        stored: u32,
        /// Version the open requested.
        requested: u32,
    },

    /// A write was attempted in a read-only transaction.
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// The database connection has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The upgrade callback failed or performed an illegal upgrade step.
    #[error("upgrade failed: {message}")]
    UpgradeFailed {
        /// Description of the failure.
        message: String,
    },
}

impl StoreError {
    /// Creates an unknown store error.
    pub fn unknown_store(name: impl Into<String>) -> Self {
        Self::UnknownStore { name: name.into() }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an upgrade failed error.
    pub fn upgrade_failed(message: impl Into<String>) -> Self {
        Self::UpgradeFailed {
            message: message.into(),
        }
    }
}
