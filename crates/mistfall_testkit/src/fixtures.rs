//! Schema and client fixtures.

use mistfall_core::{
    Adapter, Client, Column, ConnectOptions, OnDelete, Schema, SchemaOptions, Table, Value,
};
use mistfall_store::HeapEngine;
use std::sync::Arc;

/// A single `users` table: identity primary key, not-null name, enumerated
/// role defaulting to `"a"`.
pub fn users_schema() -> Schema {
    Schema::build(
        SchemaOptions::new("app"),
        vec![Table::new("users")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::text("name").not_null())
            .column(Column::enumeration("role", ["a", "b"]).default_value("a"))],
    )
    .expect("users schema")
}

/// `users` and `todos`, with `todos.owner_id` referencing `users.id` in
/// restrict mode.
pub fn todo_schema() -> Schema {
    todo_schema_with(OnDelete::Restrict)
}

/// Like [`todo_schema`], but with cascade deletion of todos.
pub fn cascade_schema() -> Schema {
    todo_schema_with(OnDelete::Cascade)
}

fn todo_schema_with(on_delete: OnDelete) -> Schema {
    Schema::build(
        SchemaOptions::new("app"),
        vec![
            Table::new("users")
                .column(Column::integer("id").primary_key().identity())
                .column(Column::text("name").not_null()),
            Table::new("todos")
                .column(Column::integer("id").primary_key().identity())
                .column(Column::text("title").not_null())
                .column(
                    Column::integer("owner_id")
                        .references_on_delete("users", "id", on_delete)
                        .not_null(),
                ),
        ],
    )
    .expect("todo schema")
}

/// A table with an `updated_at` column producing 100 on insert and
/// previous + 1 on update.
pub fn hooked_schema() -> Schema {
    Schema::build(
        SchemaOptions::new("app"),
        vec![Table::new("notes")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::text("name").not_null())
            .column(
                Column::integer("updated_at")
                    .default_fn(|| Value::Integer(100))
                    .on_update(|prev| {
                        Value::Integer(prev.and_then(Value::as_integer).unwrap_or(0) + 1)
                    }),
            )],
    )
    .expect("hooked schema")
}

/// A table with one structured payload column.
pub fn docs_schema() -> Schema {
    Schema::build(
        SchemaOptions::new("app"),
        vec![Table::new("docs")
            .column(Column::integer("id").primary_key().identity())
            .column(Column::structured("payload"))],
    )
    .expect("docs schema")
}

/// Connects a client on the memory backend.
pub fn memory_client(schema: Schema) -> Client {
    Client::connect(schema, ConnectOptions::new().adapter(Adapter::Memory))
        .expect("memory client")
}

/// Connects a client on the engine backend, over a fresh [`HeapEngine`].
pub fn engine_client(schema: Schema) -> Client {
    engine_client_on(&HeapEngine::new(), schema)
}

/// Connects a client on the engine backend over an existing engine, so
/// tests can reconnect and observe surviving state.
pub fn engine_client_on(engine: &HeapEngine, schema: Schema) -> Client {
    Client::connect(
        schema,
        ConnectOptions::new().engine(Arc::new(engine.clone())),
    )
    .expect("engine client")
}

/// Runs `test` once per backend, against a fresh client each time.
pub fn for_each_backend(schema: impl Fn() -> Schema, test: impl Fn(Client)) {
    test(memory_client(schema()));
    test(engine_client(schema()));
}
