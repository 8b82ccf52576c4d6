//! # Mistfall Core
//!
//! A typed relational runtime layered over a versioned object-store engine.
//!
//! Applications declare a [`Schema`] — tables, columns, constraints, and
//! indexes — and execute inserts, selects, updates, deletes, and multi-table
//! transactions through a [`Client`]. Two interchangeable backends implement
//! the same observable contract:
//!
//! - the **engine backend** drives any [`mistfall_store::StoreEngine`]
//!   through its versioned-open and transactional protocol, and
//! - the **memory backend** keeps rows in process-local ordered maps,
//!
//! so tests and server-side use behave like the real store.
//!
//! Every write flows through one normalization pipeline that applies
//! defaults, allocates identities, enforces not-null and foreign-key
//! constraints, runs update hooks, and materializes computed index fields.
//! Deletes honor restrict and cascade reference modes. Explicit
//! transactions roll back completely on error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mistfall_core::{Client, Column, ConnectOptions, Schema, SchemaOptions, Table};
//! use mistfall_core::predicate::eq;
//! use mistfall_store::Row;
//!
//! let schema = Schema::build(
//!     SchemaOptions::new("app"),
//!     vec![Table::new("users")
//!         .column(Column::integer("id").primary_key().identity())
//!         .column(Column::text("name").not_null())],
//! )?;
//!
//! let client = Client::connect(schema, ConnectOptions::new())?;
//! client.insert("users", vec![Row::new().with("name", "ada")])?;
//! let rows = client.select("users", Default::default())?;
//! client.delete("users", eq("id", 1i64))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod client;
mod error;
mod normalize;
mod ops;
pub mod predicate;
mod query;
mod schema;
mod session;
mod upgrade;

pub use backend::BackendKind;
pub use client::{Adapter, Client, ConnectOptions};
pub use error::{CoreError, CoreResult};
pub use normalize::{normalize_insert, normalize_update, NormalizationContext};
pub use query::{evaluate, Order, OrderBy, SelectOptions};
pub use schema::{
    Column, ColumnKind, ComputeFn, DefaultFn, Dependent, ForeignKey, Index, IndexSource, OnDelete,
    OnUpdateFn, Reference, Schema, SchemaOptions, Table,
};
pub use session::Session;

pub use mistfall_store::{Key, Row, Value};
