//! Performance benchmarks for syncdb-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use syncdb_engine::{
    diff, Countdown, Database, DatabaseSnapshot, KeyRange, Message, Migrations, Record, Schema,
    StoreDef,
};
use tokio::runtime::Runtime;

fn create_test_schema() -> Schema {
    Schema::new(1).with_store(
        StoreDef::new("users")
            .with_index("byAge", "age")
            .with_unique_index("byEmail", "email"),
    )
}

fn user(i: u64) -> Record {
    Record::new()
        .with_key(format!("user_{i}"))
        .with("name", format!("User {i}"))
        .with("email", format!("user{i}@test.com"))
        .with("age", i % 100)
}

fn populated(rt: &Runtime, size: u64) -> Database {
    rt.block_on(async {
        let db = Database::open("bench", create_test_schema(), Migrations::new())
            .await
            .unwrap();
        db.store("users")
            .put_many((0..size).map(user).collect())
            .await
            .unwrap();
        db
    })
}

fn bench_countdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("countdown");

    group.bench_function("add", |b| {
        let countdown = Countdown::new(0);
        b.iter(|| {
            countdown.add(black_box(1));
            countdown.add(black_box(-1))
        })
    });

    group.bench_function("add_with_listeners", |b| {
        let countdown = Countdown::new(0);
        for _ in 0..8 {
            countdown.on_zero(|| {});
        }
        b.iter(|| {
            countdown.add(black_box(1));
            countdown.add(black_box(-1))
        })
    });

    group.finish();
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_operations");
    let rt = Runtime::new().unwrap();

    group.bench_function("put", |b| {
        let db = populated(&rt, 0);
        let mut id = 0u64;
        b.to_async(&rt).iter(|| {
            id += 1;
            let store = db.store("users");
            let record = user(id);
            async move { store.put(black_box(record)).await }
        })
    });

    group.bench_function("get_record", |b| {
        let db = populated(&rt, 1000);
        b.to_async(&rt)
            .iter(|| async { db.store("users").get(black_box("user_500")).await })
    });

    group.bench_function("index_range", |b| {
        let db = populated(&rt, 1000);
        b.to_async(&rt).iter(|| async {
            db.store("users")
                .index_range("byAge", black_box(&[KeyRange::between(10, 20, false, true)]))
                .await
        })
    });

    group.bench_function("all", |b| {
        let db = populated(&rt, 1000);
        b.to_async(&rt).iter(|| async { db.store("users").all().await })
    });

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for width in [10, 100, 1000].iter() {
        let old: serde_json::Map<_, _> = (0..*width)
            .map(|i| (format!("field_{i}"), json!({"value": i, "tags": ["a", "b"]})))
            .collect();
        let mut new = old.clone();
        for i in (0..*width).step_by(10) {
            new.insert(format!("field_{i}"), json!({"value": i + 1, "tags": ["a"]}));
        }
        new.remove("field_1");

        group.bench_with_input(BenchmarkId::new("compute", width), width, |b, _| {
            b.iter(|| diff::diff_maps(black_box(&old), black_box(&new)))
        });

        let d = diff::diff_maps(&old, &new).unwrap();
        group.bench_with_input(BenchmarkId::new("patch", width), width, |b, _| {
            b.iter(|| {
                let mut target = old.clone();
                diff::patch_map(&mut target, black_box(&d))
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let rt = Runtime::new().unwrap();

    for size in [100, 500, 1000].iter() {
        let dir = tempfile::tempdir().unwrap();
        rt.block_on(async {
            let db = Database::open_at(dir.path(), "bench", create_test_schema(), Migrations::new())
                .await
                .unwrap();
            db.store("users")
                .put_many((0..*size).map(user).collect())
                .await
                .unwrap();
        });
        let json = std::fs::read_to_string(dir.path().join("bench.json")).unwrap();

        group.bench_with_input(BenchmarkId::new("decode", size), size, |b, _| {
            b.iter(|| DatabaseSnapshot::from_json(black_box(&json)))
        });

        group.bench_with_input(BenchmarkId::new("reopen", size), size, |b, _| {
            b.to_async(&rt).iter(|| async {
                Database::open_at(dir.path(), "bench", create_test_schema(), Migrations::new())
                    .await
            })
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    group.bench_function("message_encode", |b| {
        let message = Message::Create {
            store_name: "users".into(),
            client_id: Some("client".into()),
            record: user(1),
            timestamp: None,
        };
        b.iter(|| black_box(&message).encode())
    });

    group.bench_function("message_decode", |b| {
        let json = r#"{"type":"create","storeName":"users","record":{"key":"user_1","changedSinceSync":false,"name":"Test User"},"timestamp":12}"#;
        b.iter(|| Message::decode(black_box(json)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_countdown,
    bench_store_operations,
    bench_diff,
    bench_snapshot,
    bench_serialization,
);
criterion_main!(benches);
