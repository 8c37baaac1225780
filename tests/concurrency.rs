//! Shared-handle behavior under thread contention.

use docstore::{Matcher, Patch, PatchValue, SearchOptions, Store, StoreConfig};
use serde_json::{json, Value};
use std::thread;

fn init_tracing() {
    // RUST_LOG=docstore::sql=debug shows every statement these tests run
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn concurrent_adds_all_land() {
    init_tracing();
    let store = Store::open(StoreConfig::in_memory()).unwrap();
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    store.add(json!({"thread": t, "i": i})).unwrap();
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }
    assert_eq!(store.len().unwrap(), 40);
}

#[test]
fn concurrent_increments_serialize() {
    let store = Store::open(StoreConfig::in_memory()).unwrap();
    store.create("counter", json!({"n": 0}), None, false).unwrap();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let patch = Patch::jsonpath([(
                    "n",
                    PatchValue::transform(|old| {
                        json!(old.and_then(Value::as_i64).unwrap_or(0) + 1)
                    }),
                )]);
                for _ in 0..10 {
                    store
                        .update(
                            &Matcher::key("counter"),
                            Some(&patch),
                            None,
                            &SearchOptions::new(),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }
    assert_eq!(
        store.find("counter").unwrap().unwrap(),
        json!({"n": 40})
    );
}

#[test]
fn proxy_writes_from_threads_serialize() {
    let store = Store::open(StoreConfig::in_memory()).unwrap();
    for t in 0..4 {
        store
            .create(&format!("slot{t}"), json!({"v": 0}), None, false)
            .unwrap();
    }
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                let key = format!("slot{t}");
                let record = store.get(&key).unwrap().unwrap();
                let result = store
                    .search(&Matcher::key(key.as_str()), &SearchOptions::new())
                    .unwrap();
                let mut view = result.records.into_iter().next().unwrap();
                view.set_path("v", json!(record.id)).unwrap();
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }
    assert_eq!(store.count("v>0").unwrap(), 4);
}
