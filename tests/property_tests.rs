//! Property-based tests for implicit transaction handling
//!
//! These tests run random sequences of statements through the executor and
//! verify that:
//! - no call leaves a transaction open behind it
//! - reads return exactly the rows a simple model predicts
//! - inserts return fresh identifiers and failures are surfaced, not swallowed

#[cfg(test)]
mod tests {
    use dblink::{ConnectionConfig, ConnectionManager, QueryExecutor, QueryOptions, QueryResult, Value};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use tempfile::NamedTempFile;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(String),
        Rename(u8, String),
        Delete(u8),
        Select(u8),
        SelectAll,
        Broken,
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[a-e]{1,2}".prop_map(|s: String| s)
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            arb_name().prop_map(Op::Insert),
            (0u8..8, arb_name()).prop_map(|(id, name)| Op::Rename(id, name)),
            (0u8..8).prop_map(Op::Delete),
            (0u8..8).prop_map(Op::Select),
            Just(Op::SelectAll),
            Just(Op::Broken),
        ]
    }

    fn setup(manager: &ConnectionManager) {
        QueryExecutor::new(manager)
            .query(
                "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE)",
                (),
                &QueryOptions::default(),
            )
            .unwrap();
    }

    proptest! {
        /// Every call with default options resolves the transaction it opened
        #[test]
        fn prop_default_calls_leave_no_open_transaction(ops in prop::collection::vec(arb_op(), 1..40)) {
            let manager = ConnectionManager::new(ConnectionConfig::in_memory());
            setup(&manager);
            let executor = QueryExecutor::new(&manager);
            let options = QueryOptions::default();

            // model: id -> name
            let mut model: BTreeMap<i64, String> = BTreeMap::new();
            let mut last_id = 0i64;

            for op in ops {
                match op {
                    Op::Insert(name) => {
                        let result = executor.query(
                            "INSERT INTO items (name) VALUES (?)",
                            vec![Value::from(name.clone())],
                            &options,
                        );
                        if model.values().any(|n| *n == name) {
                            prop_assert!(result.unwrap_err().is_query());
                        } else {
                            let id = result.unwrap().insert_id().unwrap();
                            prop_assert!(id > last_id);
                            last_id = id;
                            model.insert(id, name);
                        }
                    }
                    Op::Rename(id, name) => {
                        let id = id as i64;
                        let result = executor.query(
                            "UPDATE items SET name = ? WHERE id = ?",
                            vec![Value::from(name.clone()), Value::from(id)],
                            &options,
                        );
                        let clash = model.iter().any(|(other, n)| *n == name && *other != id);
                        if clash && model.contains_key(&id) {
                            prop_assert!(result.unwrap_err().is_query());
                        } else {
                            prop_assert_eq!(result.unwrap(), QueryResult::Done);
                            if let Some(entry) = model.get_mut(&id) {
                                *entry = name;
                            }
                        }
                    }
                    Op::Delete(id) => {
                        let result = executor
                            .query("DELETE FROM items WHERE id = ?", vec![Value::from(id as i64)], &options)
                            .unwrap();
                        prop_assert_eq!(result, QueryResult::Done);
                        model.remove(&(id as i64));
                    }
                    Op::Select(id) => {
                        let result = executor
                            .query("SELECT id, name FROM items WHERE id = ?", vec![Value::from(id as i64)], &options)
                            .unwrap();
                        match model.get(&(id as i64)) {
                            Some(name) => {
                                let rows = result.rows().unwrap();
                                prop_assert_eq!(rows.len(), 1);
                                prop_assert_eq!(rows[0].get("name"), Some(&Value::Text(name.clone())));
                            }
                            None => prop_assert!(result.is_no_rows()),
                        }
                    }
                    Op::SelectAll => {
                        let result = executor
                            .query("SELECT * FROM items", (), &options)
                            .unwrap();
                        prop_assert_eq!(result.row_count(), model.len());
                        prop_assert_eq!(result.is_no_rows(), model.is_empty());
                    }
                    Op::Broken => {
                        let result = executor.query("INSERT INTO missing_table VALUES (1)", (), &options);
                        prop_assert!(result.unwrap_err().is_query());
                    }
                }

                let handle = manager.connect(true).unwrap();
                prop_assert!(!handle.in_transaction().unwrap(), "transaction left open after call");
            }
        }

        /// Data written through the executor survives reopening the database file
        #[test]
        fn prop_committed_rows_are_durable(names in prop::collection::btree_set(arb_name(), 1..6)) {
            let file = NamedTempFile::new().unwrap();
            let path = file.path().to_string_lossy().into_owned();

            {
                let manager = ConnectionManager::new(ConnectionConfig::sqlite(path.clone()));
                setup(&manager);
                let executor = QueryExecutor::new(&manager);
                for name in &names {
                    executor
                        .query("INSERT INTO items (name) VALUES (?)", vec![Value::from(name.as_str())], &QueryOptions::default())
                        .unwrap();
                }
            }

            let manager = ConnectionManager::new(ConnectionConfig::sqlite(path));
            let result = QueryExecutor::new(&manager)
                .query("SELECT name FROM items ORDER BY name", (), &QueryOptions::default())
                .unwrap();
            let stored: Vec<String> = result
                .into_rows()
                .iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
                .collect();
            prop_assert_eq!(stored, names.into_iter().collect::<Vec<_>>());
        }
    }
}
