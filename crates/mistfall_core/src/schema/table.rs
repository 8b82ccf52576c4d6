//! Table and index descriptors.

use crate::schema::column::Column;
use mistfall_store::{Row, Value};
use std::fmt;
use std::sync::Arc;

/// Expression deriving a computed index key from a row.
pub type ComputeFn = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Where an index takes its key from.
#[derive(Clone)]
pub enum IndexSource {
    /// An ordered list of source column names. The backing store indexes
    /// the first column.
    Columns(Vec<String>),
    /// A computed key. The expression's result is materialized onto the row
    /// under `field`, and the backing store indexes that field.
    Computed {
        /// Field the computed key is materialized under.
        field: String,
        /// Expression deriving the key.
        expression: ComputeFn,
    },
}

impl fmt::Debug for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexSource::Columns(columns) => f.debug_tuple("Columns").field(columns).finish(),
            IndexSource::Computed { field, .. } => {
                f.debug_struct("Computed").field("field", field).finish()
            }
        }
    }
}

/// An index declaration.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    unique: bool,
    source: IndexSource,
}

impl Index {
    /// An index over one or more source columns.
    pub fn on<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            unique: false,
            source: IndexSource::Columns(columns.into_iter().map(Into::into).collect()),
        }
    }

    /// A computed index: `expression(row)` is materialized under `field`.
    pub fn computed(
        name: impl Into<String>,
        field: impl Into<String>,
        expression: impl Fn(&Row) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            unique: false,
            source: IndexSource::Computed {
                field: field.into(),
                expression: Arc::new(expression),
            },
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the index is unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// The index key source.
    #[must_use]
    pub fn source(&self) -> &IndexSource {
        &self.source
    }

    /// The field the backing store indexes: the computed field, or the
    /// first source column.
    ///
    /// Valid on indexes owned by a resolved schema, which guarantees a
    /// non-empty source column list.
    #[must_use]
    pub fn key_path(&self) -> &str {
        match &self.source {
            IndexSource::Columns(columns) => columns.first().map(String::as_str).unwrap_or(""),
            IndexSource::Computed { field, .. } => field,
        }
    }
}

/// A table descriptor: a named, ordered set of columns and indexes.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    indexes: Vec<Index>,
    pk: usize,
}

impl Table {
    /// Creates a table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            pk: 0,
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        if column.is_primary_key() {
            self.pk = self.columns.len();
        }
        self.columns.push(column);
        self
    }

    /// Appends an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Indexes in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// The primary-key column.
    ///
    /// Valid on tables owned by a resolved [`Schema`](crate::Schema), which
    /// guarantees exactly one primary key.
    #[must_use]
    pub fn primary_key(&self) -> &Column {
        &self.columns[self.pk]
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup() {
        let table = Table::new("users")
            .column(Column::integer("id").primary_key())
            .column(Column::text("name"));

        assert!(table.get_column("id").is_some());
        assert!(table.get_column("name").is_some());
        assert!(table.get_column("missing").is_none());
        assert_eq!(table.primary_key().name(), "id");
    }

    #[test]
    fn primary_key_tracks_later_column() {
        let table = Table::new("t")
            .column(Column::text("label"))
            .column(Column::integer("id").primary_key());
        assert_eq!(table.primary_key().name(), "id");
    }

    #[test]
    fn index_key_paths() {
        let plain = Index::on("by_name", ["name", "id"]);
        assert_eq!(plain.key_path(), "name");
        assert!(!plain.is_unique());

        let computed = Index::computed("by_len", "name_len", |row| {
            Value::Integer(row.get("name").and_then(Value::as_text).map_or(0, |s| s.len() as i64))
        });
        assert_eq!(computed.key_path(), "name_len");
    }
}
