//! Schema model and reference resolution.
//!
//! A [`Schema`] is built once from table descriptors and is immutable
//! afterwards. Building performs the two resolution passes: a name lookup
//! over all declared tables, then materialization of every declared
//! reference into foreign-key metadata, plus computation of the reverse
//! dependency map and the schema signature.

mod column;
mod table;

pub use column::{Column, ColumnKind, DefaultFn, ForeignKey, OnDelete, OnUpdateFn, Reference};
pub use table::{ComputeFn, Index, IndexSource, Table};

use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Options for declaring a schema.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    name: String,
    version: u32,
    namespace: Option<String>,
}

impl SchemaOptions {
    /// Creates options for a schema named `name`, at version 1, with the
    /// namespace defaulting to the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            namespace: None,
        }
    }

    /// Sets the schema version. Must be at least 1.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the storage namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// One incoming reference: a `(table, column)` pair pointing at the keyed
/// table, with its deletion behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    /// Table holding the referencing column.
    pub table: String,
    /// The referencing column.
    pub column: String,
    /// Deletion behavior of the reference.
    pub on_delete: OnDelete,
}

/// A resolved, immutable schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    namespace: String,
    version: u32,
    tables: Vec<Table>,
    dependents: BTreeMap<String, Vec<Dependent>>,
    signature: String,
}

impl Schema {
    /// Builds and resolves a schema from table descriptors.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the shape is illegal: version 0, duplicate
    /// table or column names, a table without exactly one primary key, a
    /// primary key of a non-key kind, an identity column that is not an
    /// integer, an index over unknown or zero columns, or a reference whose
    /// target cannot be resolved.
    pub fn build(options: SchemaOptions, mut tables: Vec<Table>) -> CoreResult<Self> {
        if options.version == 0 {
            return Err(CoreError::schema("schema version must be at least 1"));
        }

        let mut names = BTreeSet::new();
        for table in &tables {
            if !names.insert(table.name().to_string()) {
                return Err(CoreError::schema(format!(
                    "duplicate table name: {}",
                    table.name()
                )));
            }
            validate_table(table)?;
        }

        resolve_references(&mut tables)?;
        let dependents = reverse_dependencies(&tables);
        let signature = signature(&tables);

        Ok(Self {
            namespace: options.namespace.unwrap_or_else(|| options.name.clone()),
            name: options.name,
            version: options.version,
            tables,
            dependents,
            signature,
        })
    }

    /// Schema name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Deterministic digest of the schema shape.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Looks up a table, failing with an unknown-table error.
    pub(crate) fn require_table(&self, name: &str) -> CoreResult<&Table> {
        self.table(name)
            .ok_or_else(|| CoreError::unknown_table(name))
    }

    /// Incoming references of a table, from the reverse dependency map.
    #[must_use]
    pub fn dependents(&self, table: &str) -> &[Dependent] {
        self.dependents.get(table).map_or(&[], Vec::as_slice)
    }

    /// The backing-store name of a table: `<namespace>__<table>`.
    #[must_use]
    pub fn storage_name(&self, table: &str) -> String {
        format!("{}__{}", self.namespace, table)
    }
}

fn validate_table(table: &Table) -> CoreResult<()> {
    if table.columns().is_empty() {
        return Err(CoreError::schema(format!(
            "table {} has no columns",
            table.name()
        )));
    }

    let mut column_names = BTreeSet::new();
    let mut primary_keys = 0usize;
    for column in table.columns() {
        if !column_names.insert(column.name().to_string()) {
            return Err(CoreError::schema(format!(
                "duplicate column name: {}.{}",
                table.name(),
                column.name()
            )));
        }
        if column.is_primary_key() {
            primary_keys += 1;
            if !column.kind().is_key_kind() {
                return Err(CoreError::schema(format!(
                    "primary key {}.{} must be an integer or string column",
                    table.name(),
                    column.name()
                )));
            }
        }
        if column.is_identity() && *column.kind() != ColumnKind::Integer {
            return Err(CoreError::schema(format!(
                "identity column {}.{} must be an integer column",
                table.name(),
                column.name()
            )));
        }
    }
    if primary_keys != 1 {
        return Err(CoreError::schema(format!(
            "table {} must declare exactly one primary key, found {primary_keys}",
            table.name()
        )));
    }

    let mut index_names = BTreeSet::new();
    for index in table.indexes() {
        if !index_names.insert(index.name().to_string()) {
            return Err(CoreError::schema(format!(
                "duplicate index name: {}.{}",
                table.name(),
                index.name()
            )));
        }
        if let IndexSource::Columns(columns) = index.source() {
            if columns.is_empty() {
                return Err(CoreError::schema(format!(
                    "index {}.{} has no source columns",
                    table.name(),
                    index.name()
                )));
            }
            for name in columns {
                if !column_names.contains(name) {
                    return Err(CoreError::schema(format!(
                        "index {}.{} names unknown column {name}",
                        table.name(),
                        index.name()
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Second resolution pass: rewrite every declared reference into
/// foreign-key metadata, validating the target exists.
fn resolve_references(tables: &mut [Table]) -> CoreResult<()> {
    let targets: BTreeMap<String, BTreeSet<String>> = tables
        .iter()
        .map(|t| {
            (
                t.name().to_string(),
                t.columns().iter().map(|c| c.name().to_string()).collect(),
            )
        })
        .collect();

    for table in tables.iter_mut() {
        let table_name = table.name().to_string();
        for column in table.columns_mut() {
            let Some(reference) = column.reference().cloned() else {
                continue;
            };
            let resolved = targets
                .get(&reference.table)
                .is_some_and(|columns| columns.contains(&reference.column));
            if !resolved {
                return Err(CoreError::schema(format!(
                    "unresolvable reference on {table_name}.{}: no column {}.{}",
                    column.name(),
                    reference.table,
                    reference.column
                )));
            }
            column.resolve_foreign_key(ForeignKey {
                target_table: reference.table,
                target_column: reference.column,
                on_delete: reference.on_delete,
            });
        }
    }
    Ok(())
}

/// For each table, the `(table, column)` pairs that point at it.
fn reverse_dependencies(tables: &[Table]) -> BTreeMap<String, Vec<Dependent>> {
    let mut map: BTreeMap<String, Vec<Dependent>> = BTreeMap::new();
    for table in tables {
        for column in table.columns() {
            if let Some(fk) = column.foreign_key() {
                map.entry(fk.target_table.clone()).or_default().push(Dependent {
                    table: table.name().to_string(),
                    column: column.name().to_string(),
                    on_delete: fk.on_delete,
                });
            }
        }
    }
    map
}

/// Digest of every table's columns and indexes. Stored in store metadata so
/// shape drift without a version bump can be detected; upgrades themselves
/// are driven by the version number, never by the signature.
fn signature(tables: &[Table]) -> String {
    let mut description = String::new();
    for table in tables {
        let _ = writeln!(description, "table:{}", table.name());
        for column in table.columns() {
            let _ = writeln!(
                description,
                "column:{}:{}:nn={}:pk={}:uq={}:id={}:def={}",
                column.name(),
                column.kind().label(),
                column.is_not_null(),
                column.is_primary_key(),
                column.is_unique(),
                column.is_identity(),
                column.has_default()
            );
        }
        for index in table.indexes() {
            let source = match index.source() {
                IndexSource::Columns(columns) => columns.join(","),
                IndexSource::Computed { field, .. } => format!("computed:{field}"),
            };
            let _ = writeln!(
                description,
                "index:{}:unique={}:{}",
                index.name(),
                index.is_unique(),
                source
            );
        }
    }

    let digest = Sha256::digest(description.as_bytes());
    let mut signature = String::with_capacity(64);
    for byte in digest {
        let _ = write!(signature, "{byte:02x}");
    }
    signature
}
