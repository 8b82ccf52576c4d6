//! Error types for the Mistfall runtime.

use mistfall_store::{Key, StoreError, Value};
use thiserror::Error;

/// Result type for runtime operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Mistfall runtime operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The schema itself is malformed. Raised at schema construction,
    /// never at runtime.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// An operation named a table the schema does not declare.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// The unknown table name.
        table: String,
    },

    /// An insert collided with an existing primary key.
    #[error("primary key violation on {table}: key {key} already exists")]
    PrimaryKeyViolation {
        /// Table the insert targeted.
        table: String,
        /// The colliding key.
        key: Key,
    },

    /// A not-null column resolved to null or stayed absent.
    #[error("not-null violation: {table}.{column}")]
    NotNullViolation {
        /// Table of the offending column.
        table: String,
        /// The offending column.
        column: String,
    },

    /// A foreign-key column points at a row that does not exist.
    #[error(
        "foreign key violation: {table}.{column} = {value} has no matching row in {target_table}.{target_column}"
    )]
    ForeignKeyViolation {
        /// Table carrying the foreign key.
        table: String,
        /// Column carrying the foreign key.
        column: String,
        /// Referenced table.
        target_table: String,
        /// Referenced column.
        target_column: String,
        /// The dangling value.
        value: Value,
    },

    /// A delete was blocked by a dependent row under restrict mode.
    #[error(
        "restricted delete: {table} row {key} is still referenced by {dependent_table}.{dependent_column}"
    )]
    RestrictedDelete {
        /// Table the delete targeted.
        table: String,
        /// Key of the row that could not be removed.
        key: Key,
        /// Table holding the dependent row.
        dependent_table: String,
        /// Column of the dependent reference.
        dependent_column: String,
    },

    /// A session operation named a table outside the declared set.
    #[error("table {table} is not declared in this transaction")]
    UndeclaredTable {
        /// The undeclared table name.
        table: String,
    },

    /// A transaction was opened with no declared tables.
    #[error("transaction requires at least one declared table")]
    EmptyTransaction,

    /// The client has been closed.
    #[error("client is closed")]
    ClientClosed,

    /// The underlying store engine reported a failure.
    #[error("store engine error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates a not-null violation.
    pub fn not_null(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::NotNullViolation {
            table: table.into(),
            column: column.into(),
        }
    }
}
