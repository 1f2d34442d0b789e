//! Edge case tests for syncdb-engine
//!
//! These tests cover boundary conditions and unusual inputs on the local
//! store side: odd payloads, index corner cases, concurrency and persistence.

use serde_json::json;
use std::sync::Arc;
use syncdb_engine::{
    diff, Database, Error, KeyRange, Migrations, Mode, Record, Schema, StoreDef,
    CHANGED_SINCE_SYNC_INDEX, META_STORE,
};

fn create_test_schema() -> Schema {
    Schema::new(1)
        .with_store(
            StoreDef::new("items")
                .with_index("byName", "name")
                .with_index("byCount", "count")
                .with_index("byAuthor", "author.name"),
        )
        .with_store(StoreDef::new("accounts").with_unique_index("byEmail", "email"))
}

async fn open() -> Database {
    Database::open("edge", create_test_schema(), Migrations::new())
        .await
        .unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[tokio::test]
async fn empty_string_fields() {
    let db = open().await;
    let items = db.store("items");
    items
        .put(Record::new().with_key("item1").with("name", ""))
        .await
        .unwrap();

    let record = items.get("item1").await.unwrap().unwrap();
    assert_eq!(record.get("name"), Some(&json!("")));

    let found = items.index_get("byName", &[json!("")]).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn unicode_keys_and_values() {
    let db = open().await;
    let items = db.store("items");

    let names = [
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
    ];
    for (i, name) in names.iter().enumerate() {
        items
            .put(Record::new().with_key(format!("ключ-{i}-{name}")).with("name", *name))
            .await
            .unwrap();
    }

    for (i, name) in names.iter().enumerate() {
        let record = items.get(&format!("ключ-{i}-{name}")).await.unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&json!(name)));
    }
}

#[tokio::test]
async fn very_long_strings() {
    let db = open().await;
    let long = "x".repeat(1_000_000);
    db.store("items")
        .put(Record::new().with_key("big").with("name", long.clone()))
        .await
        .unwrap();

    let record = db.store("items").get("big").await.unwrap().unwrap();
    assert_eq!(record.get("name").and_then(|v| v.as_str()).map(str::len), Some(1_000_000));
}

// ============================================================================
// Numeric and Index Boundaries
// ============================================================================

#[tokio::test]
async fn integer_boundaries_order_in_index() {
    let db = open().await;
    let items = db.store("items");
    let values = [json!(i64::MIN), json!(-1), json!(0), json!(1.5), json!(i64::MAX), json!(u64::MAX)];
    for (i, value) in values.iter().enumerate() {
        items
            .put(Record::new().with_key(format!("n{i}")).with("count", value.clone()))
            .await
            .unwrap();
    }

    let ascending = items
        .index_range("byCount", &[KeyRange::all()])
        .await
        .unwrap();
    let keys: Vec<_> = ascending.iter().filter_map(|r| r.key()).collect();
    assert_eq!(keys, vec!["n0", "n1", "n2", "n3", "n4", "n5"]);

    let non_negative = items
        .index_range("byCount", &[KeyRange::gte(0)])
        .await
        .unwrap();
    assert_eq!(non_negative.len(), 4);
}

#[tokio::test]
async fn null_and_missing_values_are_not_indexed() {
    let db = open().await;
    let items = db.store("items");
    items
        .put_many(vec![
            Record::new().with_key("a").with("name", serde_json::Value::Null),
            Record::new().with_key("b"),
            Record::new().with_key("c").with("name", "c"),
        ])
        .await
        .unwrap();

    let indexed = items.index_range("byName", &[KeyRange::all()]).await.unwrap();
    assert_eq!(indexed.len(), 1);
    assert_eq!(items.count().await.unwrap(), 3);
}

#[tokio::test]
async fn nested_key_path_index() {
    let db = open().await;
    let items = db.store("items");
    items
        .put(Record::new().with_key("a").with("author", json!({"name": "Ada"})))
        .await
        .unwrap();
    items
        .put(Record::new().with_key("b").with("author", json!({"name": "Grace"})))
        .await
        .unwrap();

    let found = items.index_get("byAuthor", &[json!("Grace")]).await.unwrap();
    assert_eq!(found[0].key(), Some("b"));
}

#[tokio::test]
async fn crossed_and_empty_ranges() {
    let db = open().await;
    let items = db.store("items");
    items
        .put(Record::new().with_key("a").with("count", 5))
        .await
        .unwrap();

    let crossed = items
        .index_range("byCount", &[KeyRange::between(10, 1, false, false)])
        .await
        .unwrap();
    assert!(crossed.is_empty());
    assert!(items.index_range("byCount", &[]).await.unwrap().is_empty());
    assert!(items.index_get("byCount", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn unique_index_allows_rewriting_same_record() {
    let db = open().await;
    let accounts = db.store("accounts");
    accounts
        .put(Record::new().with_key("u1").with("email", "a@x"))
        .await
        .unwrap();
    accounts
        .put(Record::new().with_key("u1").with("email", "a@x").with("name", "Ada"))
        .await
        .unwrap();

    let err = accounts
        .put(Record::new().with_key("u2").with("email", "a@x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { .. }));

    accounts
        .put(Record::new().with_key("u1").with("email", "b@x"))
        .await
        .unwrap();
    accounts
        .put(Record::new().with_key("u2").with("email", "a@x"))
        .await
        .unwrap();
}

// ============================================================================
// JSON Structure Edge Cases
// ============================================================================

#[tokio::test]
async fn deeply_nested_json() {
    let db = open().await;
    let mut nested = json!({"value": "deep"});
    for _ in 0..50 {
        nested = json!({"nested": nested});
    }

    db.store("items")
        .put(Record::new().with_key("deep").with("data", nested.clone()))
        .await
        .unwrap();
    let record = db.store("items").get("deep").await.unwrap().unwrap();
    assert_eq!(record.get("data"), Some(&nested));
}

#[test]
fn diff_with_all_types() {
    let old = json!({
        "string": "hello",
        "number": 42,
        "float": 3.14,
        "bool": true,
        "null": null,
        "array": [1, 2, 3],
        "object": {"nested": "value", "keep": 1},
    });
    let new = json!({
        "string": "hello",
        "number": 43,
        "float": 3.14,
        "bool": false,
        "array": [1, 2],
        "object": {"nested": "changed", "keep": 1},
        "added": {"fresh": true},
    });

    let d = diff::diff(&old, &new).unwrap();
    assert_eq!(d.unset, vec!["null".to_string()]);
    assert!(d.nested.contains_key("object"));

    let mut patched = old;
    diff::patch(&mut patched, &d).unwrap();
    assert_eq!(patched, new);
}

#[test]
fn reserved_fields_stay_out_of_payload() {
    let record = Record::from_value(json!({
        "key": "a",
        "version": 7,
        "changedSinceSync": false,
        "payload": {"key": "inner"},
    }))
    .unwrap();
    assert_eq!(record.payload(), json!({"payload": {"key": "inner"}}));
}

// ============================================================================
// Concurrency Edge Cases
// ============================================================================

#[tokio::test]
async fn concurrent_writers_all_land() {
    let db = Arc::new(open().await);
    let mut handles = Vec::new();
    for i in 0..32 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.store("items")
                .put(Record::new().with_key(format!("k{i}")).with("count", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(db.store("items").count().await.unwrap(), 32);
    let dirty = db
        .store("items")
        .index_get(CHANGED_SINCE_SYNC_INDEX, &[json!(true)])
        .await
        .unwrap();
    assert_eq!(dirty.len(), 32);
}

#[tokio::test]
async fn rapid_updates_same_record() {
    let db = open().await;
    let mut changes = db.changes();
    for i in 0..100 {
        db.store("items")
            .put(Record::new().with_key("same").with("count", i))
            .await
            .unwrap();
    }

    let record = db.store("items").get("same").await.unwrap().unwrap();
    assert_eq!(record.get("count"), Some(&json!(99)));

    let mut seen = 0;
    while let Ok(change) = changes.try_recv() {
        assert_eq!(change.record.get("count"), Some(&json!(seen)));
        seen += 1;
    }
    assert_eq!(seen, 100);
}

#[tokio::test]
async fn multi_store_transaction_is_atomic() {
    let db = open().await;
    let result = db
        .transaction(&["items", "accounts"], Mode::ReadWrite, |tx| {
            tx.store("items")?.put(Record::new().with_key("i"))?;
            tx.store("accounts")?.add(Record::new().with_key("u"))?;
            tx.store("accounts")?.add(Record::new().with_key("u"))?;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(Error::RecordAlreadyExists(_))));
    assert!(db.store("items").get("i").await.unwrap().is_none());
    assert!(db.store("accounts").get("u").await.unwrap().is_none());
}

#[tokio::test]
async fn store_outside_scope_is_rejected() {
    let db = open().await;
    let result = db
        .transaction(&["items"], Mode::ReadWrite, |tx| {
            tx.store("accounts")?.put(Record::new())
        })
        .await;
    assert!(matches!(result, Err(Error::StoreNotInScope(_))));
}

// ============================================================================
// Persistence Edge Cases
// ============================================================================

#[tokio::test]
async fn identity_and_watermarks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let db = Database::open_at(dir.path(), "app", create_test_schema(), Migrations::new())
            .await
            .unwrap();
        db.client_id().await.unwrap()
    };

    let db = Database::open_at(dir.path(), "app", create_test_schema(), Migrations::new())
        .await
        .unwrap();
    assert_eq!(db.client_id().await.unwrap(), id);
    assert!(db.store(META_STORE).get("itemsMeta").await.unwrap().is_some());
}

#[tokio::test]
async fn aborted_transaction_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open_at(dir.path(), "app", create_test_schema(), Migrations::new())
            .await
            .unwrap();
        db.store("items").put(Record::new().with_key("kept")).await.unwrap();
        let _ = db
            .transaction(&["items"], Mode::ReadWrite, |tx| {
                tx.store("items")?.put(Record::new().with_key("dropped"))?;
                Err::<(), _>(Error::InvalidRecord("abort".into()))
            })
            .await;
    }

    let db = Database::open_at(dir.path(), "app", create_test_schema(), Migrations::new())
        .await
        .unwrap();
    assert!(db.store("items").get("kept").await.unwrap().is_some());
    assert!(db.store("items").get("dropped").await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_snapshot_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.json"), "{ not json").unwrap();

    let result = Database::open_at(dir.path(), "app", create_test_schema(), Migrations::new()).await;
    assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
}
