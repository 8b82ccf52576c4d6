//! Version-driven upgrade planning.
//!
//! The planner runs inside the engine's upgrade callback whenever a
//! database is opened below the schema's version. It is additive only: it
//! creates what is missing and never drops or reshapes existing stores.

use crate::backend::{META_KEY_PATH, META_STORE, SEQ_KEY_PATH, SEQ_STORE};
use crate::schema::Schema;
use mistfall_store::{IndexSpec, Row, StoreResult, UpgradeContext, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Applies a schema to a database during a versioned open.
pub(crate) struct UpgradePlanner<'a> {
    schema: &'a Schema,
}

impl<'a> UpgradePlanner<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Creates missing stores and indexes and records the schema metadata.
    ///
    /// The `__meta` record carries the schema signature so shape drift
    /// without a version bump can be detected later; the upgrade itself is
    /// driven purely by the version number.
    pub(crate) fn apply(&self, ctx: &mut dyn UpgradeContext) -> StoreResult<()> {
        tracing::info!(
            from = ctx.old_version(),
            to = ctx.new_version(),
            "upgrading database schema"
        );

        if !ctx.has_store(META_STORE) {
            ctx.create_store(META_STORE, META_KEY_PATH)?;
        }
        if !ctx.has_store(SEQ_STORE) {
            ctx.create_store(SEQ_STORE, SEQ_KEY_PATH)?;
        }

        for table in self.schema.tables() {
            let store = self.schema.storage_name(table.name());
            if !ctx.has_store(&store) {
                ctx.create_store(&store, table.primary_key().name())?;
                tracing::debug!(store = %store, "object store created");
            }
            for index in table.indexes() {
                if !ctx.has_index(&store, index.name())? {
                    ctx.create_index(
                        &store,
                        IndexSpec {
                            name: index.name().to_string(),
                            key_path: index.key_path().to_string(),
                            unique: index.is_unique(),
                        },
                    )?;
                    tracing::debug!(store = %store, index = index.name(), "index created");
                }
            }
        }

        let meta = Row::new()
            .with("key", "schema")
            .with("version", i64::from(self.schema.version()))
            .with("signature", self.schema.signature())
            .with("upgradedAt", Value::Timestamp(now_millis()));
        ctx.put(META_STORE, meta)?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Index, SchemaOptions, Table};
    use mistfall_store::{HeapEngine, Key, StoreEngine, TransactionMode};

    fn schema(version: u32) -> Schema {
        Schema::build(
            SchemaOptions::new("app").version(version),
            vec![
                Table::new("users")
                    .column(Column::integer("id").primary_key().identity())
                    .column(Column::text("name").not_null())
                    .index(Index::on("by_name", ["name"])),
                Table::new("todos")
                    .column(Column::integer("id").primary_key().identity())
                    .column(Column::integer("owner_id").references("users", "id")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn fresh_open_creates_reserved_and_table_stores() {
        let engine = HeapEngine::new();
        let schema = schema(1);
        let planner = UpgradePlanner::new(&schema);

        let db = engine.open("app", 1, &mut |ctx| planner.apply(ctx)).unwrap();
        assert_eq!(db.name(), "app");

        for store in ["__meta", "__seq", "app__users", "app__todos"] {
            assert!(
                db.transaction(&[store], TransactionMode::ReadOnly).is_ok(),
                "missing store {store}"
            );
        }
    }

    #[test]
    fn meta_record_carries_version_and_signature() {
        let engine = HeapEngine::new();
        let schema = schema(2);
        let planner = UpgradePlanner::new(&schema);

        let db = engine.open("app", 2, &mut |ctx| planner.apply(ctx)).unwrap();

        let txn = db.transaction(&["__meta"], TransactionMode::ReadOnly).unwrap();
        let record = txn.get("__meta", &Key::Text("schema".into())).unwrap().unwrap();
        assert_eq!(record.get("version"), Some(&Value::Integer(2)));
        assert_eq!(
            record.get("signature").and_then(Value::as_text),
            Some(schema.signature())
        );
        assert!(matches!(
            record.get("upgradedAt"),
            Some(Value::Timestamp(_))
        ));
    }

    #[test]
    fn version_bump_adds_new_table_keeping_data() {
        let engine = HeapEngine::new();

        // Version 1: users only.
        let v1 = Schema::build(
            SchemaOptions::new("app"),
            vec![Table::new("users")
                .column(Column::integer("id").primary_key().identity())
                .column(Column::text("name").not_null())],
        )
        .unwrap();
        {
            let planner = UpgradePlanner::new(&v1);
            let db = engine.open("app", 1, &mut |ctx| planner.apply(ctx)).unwrap();
            let mut txn = db
                .transaction(&["app__users"], TransactionMode::ReadWrite)
                .unwrap();
            txn.insert(
                "app__users",
                Row::new().with("id", 1i64).with("name", "kept"),
            )
            .unwrap();
            txn.commit().unwrap();
        }

        // Version 2 adds todos; existing users rows survive.
        let v2 = schema(2);
        let planner = UpgradePlanner::new(&v2);
        let db = engine.open("app", 2, &mut |ctx| planner.apply(ctx)).unwrap();

        let txn = db
            .transaction(&["app__users", "app__todos"], TransactionMode::ReadOnly)
            .unwrap();
        assert_eq!(txn.scan("app__users").unwrap().len(), 1);
        assert_eq!(txn.scan("app__todos").unwrap().len(), 0);
    }

    #[test]
    fn reopen_at_same_version_is_a_no_op() {
        let engine = HeapEngine::new();
        let schema = schema(1);

        {
            let planner = UpgradePlanner::new(&schema);
            engine.open("app", 1, &mut |ctx| planner.apply(ctx)).unwrap();
        }
        // The upgrade callback must not run again.
        let db = engine
            .open("app", 1, &mut |_| {
                panic!("upgrade ran at unchanged version")
            })
            .unwrap();
        assert_eq!(db.version(), 1);
    }
}
