//! Property-based invariant checks, run against both backends.

use mistfall_core::predicate::eq;
use mistfall_core::{Client, CoreError, Row, SelectOptions, Value};
use mistfall_testkit::{
    docs_schema, engine_client, lossy_user_batch_strategy, memory_client, todo_schema,
    user_batch_strategy, users_schema, value_strategy,
};
use proptest::prelude::*;

fn both_clients() -> Vec<Client> {
    vec![memory_client(users_schema()), engine_client(users_schema())]
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get("id").and_then(Value::as_integer).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn primary_keys_stay_unique(batch in user_batch_strategy(1..16)) {
        for client in both_clients() {
            client.insert("users", batch.clone()).unwrap();

            let mut seen = ids(&client.select("users", SelectOptions::new()).unwrap());
            let len = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), len);
        }
    }

    #[test]
    fn identities_strictly_increase(batch in user_batch_strategy(1..16)) {
        for client in both_clients() {
            let mut allocated = Vec::new();
            for row in &batch {
                let stored = client.insert_one("users", row.clone()).unwrap();
                allocated.push(stored.get("id").and_then(Value::as_integer).unwrap());
            }

            for pair in allocated.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            prop_assert!(allocated.iter().all(|id| *id > 0));
        }
    }

    #[test]
    fn not_null_columns_never_commit_null(batch in lossy_user_batch_strategy(1..16)) {
        for client in both_clients() {
            let mut accepted = 0usize;
            for row in &batch {
                match client.insert_one("users", row.clone()) {
                    Ok(stored) => {
                        accepted += 1;
                        prop_assert!(stored.get("name").is_some_and(|v| !v.is_null()));
                    }
                    Err(err) => {
                        prop_assert!(matches!(err, CoreError::NotNullViolation { .. }), "expected NotNullViolation");
                    }
                }
            }

            let committed = client.select("users", SelectOptions::new()).unwrap();
            prop_assert_eq!(committed.len(), accepted);
            for row in &committed {
                prop_assert!(row.get("name").is_some_and(|v| !v.is_null()));
            }
        }
    }

    #[test]
    fn foreign_keys_always_resolve(
        users in user_batch_strategy(1..6),
        owners in prop::collection::vec(1i64..10, 1..12),
    ) {
        for client in [memory_client(todo_schema()), engine_client(todo_schema())] {
            let user_count = users.len() as i64;
            client.insert("users", users.clone()).unwrap();

            for owner in &owners {
                let result = client.insert_one(
                    "todos",
                    Row::new().with("title", "t").with("owner_id", *owner),
                );
                if *owner <= user_count {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(matches!(result, Err(CoreError::ForeignKeyViolation { .. })), "expected ForeignKeyViolation");
                }
            }

            // Every committed reference points at an existing user.
            let committed = client.select("todos", SelectOptions::new()).unwrap();
            for todo in &committed {
                let owner = todo.get("owner_id").and_then(Value::as_integer).unwrap();
                let matches = client
                    .select("users", SelectOptions::new().filter(eq("id", owner)))
                    .unwrap();
                prop_assert_eq!(matches.len(), 1);
            }
        }
    }

    #[test]
    fn rollback_restores_pre_transaction_state(
        pre in user_batch_strategy(0..6),
        inside in user_batch_strategy(1..6),
    ) {
        for client in both_clients() {
            client.insert("users", pre.clone()).unwrap();
            let before = client
                .select("users", SelectOptions::new().order_by("id"))
                .unwrap();

            let result: Result<(), CoreError> = client.transaction(&["users"], |session| {
                session.insert("users", inside.clone())?;
                Err(CoreError::schema("forced failure"))
            });
            prop_assert!(result.is_err());

            let after = client
                .select("users", SelectOptions::new().order_by("id"))
                .unwrap();
            prop_assert_eq!(&after, &before);

            // Sequence counters rolled back with the rows: the next insert
            // continues right after the pre-transaction maximum.
            let next = client
                .insert_one("users", Row::new().with("name", "next"))
                .unwrap();
            prop_assert_eq!(
                next.get("id").and_then(Value::as_integer).unwrap(),
                pre.len() as i64 + 1
            );
        }
    }

    #[test]
    fn insert_round_trips_through_select(name in mistfall_testkit::name_strategy()) {
        for client in both_clients() {
            let stored = client
                .insert_one("users", Row::new().with("name", name.clone()))
                .unwrap();

            let id = stored.get("id").cloned().unwrap();
            let found = client
                .select("users", SelectOptions::new().filter(eq("id", id)))
                .unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(&found[0], &stored);
        }
    }

    #[test]
    fn structured_payloads_round_trip_uncorrupted(payload in value_strategy()) {
        for client in [memory_client(docs_schema()), engine_client(docs_schema())] {
            let stored = client
                .insert_one("docs", Row::new().with("payload", payload.clone()))
                .unwrap();
            prop_assert_eq!(stored.get("payload"), Some(&payload));

            let id = stored.get("id").cloned().unwrap();
            let found = client
                .select("docs", SelectOptions::new().filter(eq("id", id)))
                .unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(found[0].get("payload"), Some(&payload));
        }
    }

    #[test]
    fn repeated_selects_are_identical(batch in user_batch_strategy(1..12)) {
        for client in both_clients() {
            client.insert("users", batch.clone()).unwrap();

            let options = || {
                SelectOptions::new()
                    .filter(|r: &Row| {
                        r.get("id").and_then(Value::as_integer).unwrap_or(0) % 2 == 1
                    })
                    .order_by("name")
                    .limit(5)
            };
            let first = client.select("users", options()).unwrap();
            let second = client.select("users", options()).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn returned_rows_are_isolated_clones(batch in user_batch_strategy(1..8)) {
        for client in both_clients() {
            let mut inserted = client.insert("users", batch.clone()).unwrap();
            for row in &mut inserted {
                row.set("name", "TAMPERED");
                row.set("injected", Value::Bool(true));
            }

            let committed = client.select("users", SelectOptions::new()).unwrap();
            for row in &committed {
                prop_assert!(row.get("injected").is_none());
                prop_assert_ne!(row.get("name"), Some(&Value::Text("TAMPERED".into())));
            }
        }
    }
}
