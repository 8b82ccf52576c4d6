//! Storage backends implementing the client contract.

pub(crate) mod memory;
pub(crate) mod store;

use std::fmt;

/// Name of the reserved metadata store.
pub(crate) const META_STORE: &str = "__meta";

/// Name of the reserved sequence store.
pub(crate) const SEQ_STORE: &str = "__seq";

/// Key path of the metadata store.
pub(crate) const META_KEY_PATH: &str = "key";

/// Key path of the sequence store.
pub(crate) const SEQ_KEY_PATH: &str = "table";

/// Which backend a client is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The engine-driven backend.
    Persistent,
    /// The in-process memory backend.
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Persistent => f.write_str("persistent"),
            BackendKind::Memory => f.write_str("memory"),
        }
    }
}
