//! Column descriptors.

use mistfall_store::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Zero-argument producer for a column's default value.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Producer invoked on update with the column's previous value.
pub type OnUpdateFn = Arc<dyn Fn(Option<&Value>) -> Value + Send + Sync>;

/// Semantic kind of a column.
///
/// Kinds are schema metadata: they drive store layout and the schema
/// signature, but the runtime does not type-check cell values against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// 64-bit signed integer.
    Integer,
    /// Wide integer.
    BigInteger,
    /// IEEE 754 double.
    Float,
    /// Fixed-point decimal.
    Decimal {
        /// Total number of digits.
        precision: u8,
        /// Digits after the decimal point.
        scale: u8,
    },
    /// Bounded string.
    VarChar {
        /// Maximum length in characters.
        length: u32,
    },
    /// Unbounded string.
    Text,
    /// Boolean.
    Boolean,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// Arbitrarily nested structured value.
    Structured,
    /// String restricted to a fixed set of values.
    Enumeration {
        /// The admissible values.
        values: Vec<String>,
    },
}

impl ColumnKind {
    /// Canonical label used in the schema signature.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            ColumnKind::Integer => "integer".into(),
            ColumnKind::BigInteger => "bigint".into(),
            ColumnKind::Float => "float".into(),
            ColumnKind::Decimal { precision, scale } => format!("decimal({precision},{scale})"),
            ColumnKind::VarChar { length } => format!("varchar({length})"),
            ColumnKind::Text => "text".into(),
            ColumnKind::Boolean => "boolean".into(),
            ColumnKind::Timestamp => "timestamp".into(),
            ColumnKind::Structured => "structured".into(),
            ColumnKind::Enumeration { values } => format!("enum({})", values.join("|")),
        }
    }

    /// Whether values of this kind are admissible store keys.
    #[must_use]
    pub fn is_key_kind(&self) -> bool {
        matches!(
            self,
            ColumnKind::Integer | ColumnKind::VarChar { .. } | ColumnKind::Text
        )
    }
}

/// Deletion behavior of a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnDelete {
    /// Reject deleting a referenced row.
    #[default]
    Restrict,
    /// Delete dependent rows together with the referenced row.
    Cascade,
}

/// A declared, not yet resolved reference to another table's column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
    /// Deletion behavior.
    pub on_delete: OnDelete,
}

/// Materialized foreign-key metadata, produced by schema resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table name.
    pub target_table: String,
    /// Referenced column name.
    pub target_column: String,
    /// Deletion behavior.
    pub on_delete: OnDelete,
}

/// A column descriptor.
///
/// Columns are assembled builder-style and become immutable once their
/// table is handed to [`Schema::build`](crate::Schema::build).
#[derive(Clone)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    not_null: bool,
    primary_key: bool,
    unique: bool,
    identity: bool,
    default_value: Option<Value>,
    default_fn: Option<DefaultFn>,
    on_update: Option<OnUpdateFn>,
    reference: Option<Reference>,
    foreign_key: Option<ForeignKey>,
}

impl Column {
    fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            not_null: false,
            primary_key: false,
            unique: false,
            identity: false,
            default_value: None,
            default_fn: None,
            on_update: None,
            reference: None,
            foreign_key: None,
        }
    }

    /// An integer column.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    /// A wide integer column.
    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::BigInteger)
    }

    /// A float column.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Float)
    }

    /// A fixed-point decimal column.
    pub fn decimal(name: impl Into<String>, precision: u8, scale: u8) -> Self {
        Self::new(name, ColumnKind::Decimal { precision, scale })
    }

    /// A bounded string column.
    pub fn varchar(name: impl Into<String>, length: u32) -> Self {
        Self::new(name, ColumnKind::VarChar { length })
    }

    /// An unbounded string column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    /// A boolean column.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Boolean)
    }

    /// A timestamp column.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Timestamp)
    }

    /// A structured-value column.
    pub fn structured(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Structured)
    }

    /// An enumerated string column.
    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            ColumnKind::Enumeration {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Marks the column not-null.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as the table's primary key. Implies not-null.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Marks the column unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as identity: missing values are allocated from the
    /// table's monotonic sequence.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Sets a literal default, applied (as a deep copy) when an insert does
    /// not carry the column.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets a default producer, invoked when an insert does not carry the
    /// column. Takes precedence over a literal default.
    #[must_use]
    pub fn default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default_fn = Some(Arc::new(f));
        self
    }

    /// Sets an update hook, invoked with the previous value whenever an
    /// update patch does not explicitly carry the column.
    #[must_use]
    pub fn on_update(
        mut self,
        f: impl Fn(Option<&Value>) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Declares a restrict-mode reference to another table's column.
    #[must_use]
    pub fn references(self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references_on_delete(table, column, OnDelete::Restrict)
    }

    /// Declares a reference with an explicit deletion behavior.
    #[must_use]
    pub fn references_on_delete(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        self.reference = Some(Reference {
            table: table.into(),
            column: column.into(),
            on_delete,
        });
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic kind.
    #[must_use]
    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    /// Whether the column is not-null.
    #[must_use]
    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    /// Whether the column is the primary key.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether the column is unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the column is an identity column.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Whether the column carries a literal default or a default producer.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.default_value.is_some() || self.default_fn.is_some()
    }

    /// The literal default, if any.
    #[must_use]
    pub fn literal_default(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// The default producer, if any.
    #[must_use]
    pub fn default_producer(&self) -> Option<&DefaultFn> {
        self.default_fn.as_ref()
    }

    /// The update hook, if any.
    #[must_use]
    pub fn update_hook(&self) -> Option<&OnUpdateFn> {
        self.on_update.as_ref()
    }

    /// The declared reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// The resolved foreign-key metadata, if any. Filled during schema
    /// resolution.
    #[must_use]
    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.foreign_key.as_ref()
    }

    pub(crate) fn resolve_foreign_key(&mut self, foreign_key: ForeignKey) {
        self.foreign_key = Some(foreign_key);
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("not_null", &self.not_null)
            .field("primary_key", &self.primary_key)
            .field("unique", &self.unique)
            .field("identity", &self.identity)
            .field("has_default", &self.has_default())
            .field("reference", &self.reference)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_implies_not_null() {
        let column = Column::integer("id").primary_key();
        assert!(column.is_primary_key());
        assert!(column.is_not_null());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ColumnKind::Integer.label(), "integer");
        assert_eq!(
            ColumnKind::Decimal {
                precision: 10,
                scale: 2
            }
            .label(),
            "decimal(10,2)"
        );
        assert_eq!(ColumnKind::VarChar { length: 64 }.label(), "varchar(64)");
        assert_eq!(
            ColumnKind::Enumeration {
                values: vec!["a".into(), "b".into()]
            }
            .label(),
            "enum(a|b)"
        );
    }

    #[test]
    fn key_kinds() {
        assert!(ColumnKind::Integer.is_key_kind());
        assert!(ColumnKind::Text.is_key_kind());
        assert!(ColumnKind::VarChar { length: 8 }.is_key_kind());
        assert!(!ColumnKind::Float.is_key_kind());
        assert!(!ColumnKind::Boolean.is_key_kind());
    }

    #[test]
    fn default_producer_wins_over_literal() {
        let column = Column::text("role")
            .default_value("literal")
            .default_fn(|| Value::Text("produced".into()));
        assert!(column.has_default());
        assert!(column.default_producer().is_some());
        assert!(column.literal_default().is_some());
    }

    #[test]
    fn reference_declaration() {
        let column = Column::integer("owner_id").references("users", "id");
        let reference = column.reference().unwrap();
        assert_eq!(reference.table, "users");
        assert_eq!(reference.column, "id");
        assert_eq!(reference.on_delete, OnDelete::Restrict);
        assert!(column.foreign_key().is_none());
    }
}
