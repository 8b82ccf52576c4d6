//! Client facade and backend selection.

use crate::backend::memory::MemoryBackend;
use crate::backend::store::StoreBackend;
use crate::backend::BackendKind;
use crate::error::{CoreError, CoreResult};
use crate::query::SelectOptions;
use crate::schema::Schema;
use crate::session::Session;
use mistfall_store::{Row, StoreEngine};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Backend selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Adapter {
    /// Use the engine backend when a store engine is supplied, else memory.
    #[default]
    Auto,
    /// Always use the memory backend.
    Memory,
}

/// Options for [`Client::connect`].
#[derive(Clone, Default)]
pub struct ConnectOptions {
    db_name: Option<String>,
    adapter: Adapter,
    engine: Option<Arc<dyn StoreEngine>>,
}

impl ConnectOptions {
    /// Default options: auto adapter, database named after the schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the database name (default: the schema name).
    #[must_use]
    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    /// Sets the backend selection strategy.
    #[must_use]
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Supplies the store engine the `Auto` adapter should drive.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn StoreEngine>) -> Self {
        self.engine = Some(engine);
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("db_name", &self.db_name)
            .field("adapter", &self.adapter)
            .field("engine", &self.engine.is_some())
            .finish()
    }
}

enum Backend {
    Memory(MemoryBackend),
    Engine(StoreBackend),
}

/// The runtime's entry point: a schema bound to one backend.
///
/// All operations are routed through the normalization pipeline and return
/// cloned rows; the caller owns its copies. Single operations run in
/// implicit transactions, [`Client::transaction`] runs several as one unit
/// with rollback on error.
pub struct Client {
    schema: Arc<Schema>,
    backend: Backend,
    open: AtomicBool,
}

impl Client {
    /// Connects a schema to a backend.
    ///
    /// With [`Adapter::Auto`], the engine backend is used when the options
    /// supply a store engine (opening — and if needed upgrading — the
    /// database named by `db_name`); otherwise the memory backend serves
    /// the same contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the open (version conflict)
    /// or the upgrade fails.
    pub fn connect(schema: Schema, options: ConnectOptions) -> CoreResult<Self> {
        let schema = Arc::new(schema);
        let backend = match (options.adapter, options.engine) {
            (Adapter::Auto, Some(engine)) => {
                let db_name = options
                    .db_name
                    .unwrap_or_else(|| schema.name().to_string());
                Backend::Engine(StoreBackend::open(
                    Arc::clone(&schema),
                    engine.as_ref(),
                    &db_name,
                )?)
            }
            (Adapter::Auto, None) | (Adapter::Memory, _) => {
                Backend::Memory(MemoryBackend::new(Arc::clone(&schema)))
            }
        };

        let client = Self {
            schema,
            backend,
            open: AtomicBool::new(true),
        };
        tracing::debug!(
            schema = client.schema.name(),
            kind = %client.kind(),
            "client connected"
        );
        Ok(client)
    }

    /// Which backend this client runs on.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match &self.backend {
            Backend::Memory(_) => BackendKind::Memory,
            Backend::Engine(_) => BackendKind::Persistent,
        }
    }

    /// The resolved schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Normalizes and inserts rows, returning the stored forms.
    pub fn insert(&self, table: &str, rows: Vec<Row>) -> CoreResult<Vec<Row>> {
        self.ensure_open()?;
        let table = self.schema.require_table(table)?;
        match &self.backend {
            Backend::Memory(backend) => backend.insert(table, rows),
            Backend::Engine(backend) => backend.insert(table, rows),
        }
    }

    /// Inserts one row, returning the stored form.
    pub fn insert_one(&self, table: &str, row: Row) -> CoreResult<Row> {
        let mut rows = self.insert(table, vec![row])?;
        rows.pop()
            .ok_or_else(|| CoreError::schema("insert produced no row"))
    }

    /// Selects rows with filter, ordering, and pagination. Without an
    /// explicit order, rows come back in ascending primary-key order.
    pub fn select(&self, table: &str, options: SelectOptions) -> CoreResult<Vec<Row>> {
        self.ensure_open()?;
        let table = self.schema.require_table(table)?;
        match &self.backend {
            Backend::Memory(backend) => backend.select(table, &options),
            Backend::Engine(backend) => backend.select(table, &options),
        }
    }

    /// Updates rows matching the predicate with the normalized patch.
    /// Returns the number of rows updated.
    pub fn update(
        &self,
        table: &str,
        predicate: impl Fn(&Row) -> bool,
        patch: Row,
    ) -> CoreResult<usize> {
        self.ensure_open()?;
        let table = self.schema.require_table(table)?;
        match &self.backend {
            Backend::Memory(backend) => backend.update(table, &predicate, &patch),
            Backend::Engine(backend) => backend.update(table, &predicate, &patch),
        }
    }

    /// Deletes rows matching the predicate, honoring restrict and cascade
    /// reference modes. Returns the number of rows removed.
    pub fn delete(&self, table: &str, predicate: impl Fn(&Row) -> bool) -> CoreResult<usize> {
        self.ensure_open()?;
        let table = self.schema.require_table(table)?;
        match &self.backend {
            Backend::Memory(backend) => backend.delete(table, &predicate),
            Backend::Engine(backend) => backend.delete(table, &predicate),
        }
    }

    /// Runs `f` as one transaction over the declared tables.
    ///
    /// On the engine backend one engine transaction spans the session, and
    /// operations are restricted to the declared tables. If `f` fails, all
    /// of the session's writes are rolled back and the error is returned.
    ///
    /// # Errors
    ///
    /// Fails immediately with an empty-transaction error if `tables` is
    /// empty, or an unknown-table error if a declared table is not in the
    /// schema.
    pub fn transaction<T>(
        &self,
        tables: &[&str],
        f: impl FnOnce(&mut Session<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.ensure_open()?;
        if tables.is_empty() {
            return Err(CoreError::EmptyTransaction);
        }
        let tables: Vec<&crate::schema::Table> = tables
            .iter()
            .map(|name| self.schema.require_table(name))
            .collect::<CoreResult<_>>()?;

        match &self.backend {
            Backend::Memory(backend) => backend.transaction(f),
            Backend::Engine(backend) => backend.transaction(&tables, f),
        }
    }

    /// Closes the client. Later operations fail; the engine backend's
    /// database handle is released.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Backend::Engine(backend) = &self.backend {
                backend.close();
            }
            tracing::debug!(schema = self.schema.name(), "client closed");
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ClientClosed)
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("schema", &self.schema.name())
            .field("kind", &self.kind())
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}
