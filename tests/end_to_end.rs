//! Full-stack lifecycle coverage on the SQLite backend.

use docstore::{
    Column, Error, Matcher, Patch, PatchValue, SchemaRegistry, SearchOptions, Store, StoreConfig,
    StoreRegistry,
};
use serde_json::{json, Value};

fn store() -> Store {
    Store::open(StoreConfig::in_memory()).unwrap()
}

#[test]
fn add_generates_keys_and_round_trips() {
    let store = store();
    let view = store.add(json!({"kind": "note", "n": 1})).unwrap();
    assert!(view.key().starts_with("STORE_"));
    assert_eq!(view.key().len(), "STORE_".len() + 32);

    let record = store.get(view.key()).unwrap().unwrap();
    assert_eq!(record.data, json!({"kind": "note", "n": 1}));
    assert_eq!(record.create, record.update);
}

#[test]
fn default_meta_is_attached_to_added_records() {
    let store = Store::open(
        StoreConfig::in_memory().default_meta(json!({"source": "ingest"})),
    )
    .unwrap();
    let view = store.add(json!({"n": 1})).unwrap();
    assert_eq!(
        store.find_meta(view.key()).unwrap().unwrap(),
        json!({"source": "ingest"})
    );
}

#[test]
fn add_with_meta_overrides_the_default() {
    let store = Store::open(
        StoreConfig::in_memory().default_meta(json!({"source": "ingest"})),
    )
    .unwrap();
    let view = store
        .add_with_meta(json!({"n": 1}), json!({"source": "manual"}))
        .unwrap();
    assert_eq!(
        store.find_meta(view.key()).unwrap().unwrap(),
        json!({"source": "manual"})
    );
}

#[test]
fn file_backed_stores_persist_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.sqlite");
    let path = path.to_str().unwrap();

    {
        let store = Store::open(StoreConfig::sqlite(path)).unwrap();
        store.create("k1", json!({"n": 1}), None, false).unwrap();
    }
    let store = Store::open(StoreConfig::sqlite(path)).unwrap();
    assert_eq!(store.find("k1").unwrap().unwrap(), json!({"n": 1}));
}

#[test]
fn condition_driven_update_and_delete() {
    let store = store();
    for n in 1..=5 {
        store
            .create(&format!("r{n}"), json!({"n": n}), None, false)
            .unwrap();
    }

    // bump every n>2 by ten
    let patch = Patch::jsonpath([(
        "n",
        PatchValue::transform(|old| json!(old.and_then(Value::as_i64).unwrap_or(0) + 10)),
    )]);
    let (keys, n) = store
        .update(&Matcher::expr("n>2"), Some(&patch), None, &SearchOptions::new())
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(keys.len(), 3);
    assert_eq!(store.find("r1").unwrap().unwrap(), json!({"n": 1}));
    assert_eq!(store.find("r4").unwrap().unwrap(), json!({"n": 14}));

    // untouched records still match the low range
    assert_eq!(store.count("n:[1,2]").unwrap(), 2);

    let (_, removed) = store
        .delete(&Matcher::expr("n>=10"), &SearchOptions::new())
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn nest_patch_merges_into_objects() {
    let store = store();
    store
        .create("k1", json!({"a": {"x": 1}, "keep": true}), None, false)
        .unwrap();
    let patch = Patch::nest(json!({"a": {"y": 2}}));
    store
        .update(&Matcher::key("k1"), Some(&patch), None, &SearchOptions::new())
        .unwrap();
    assert_eq!(
        store.find("k1").unwrap().unwrap(),
        json!({"a": {"x": 1, "y": 2}, "keep": true})
    );
}

#[test]
fn meta_column_search() {
    let store = store();
    store
        .create("a", json!({}), Some(json!({"env": "prod"})), false)
        .unwrap();
    store
        .create("b", json!({}), Some(json!({"env": "dev"})), false)
        .unwrap();

    let result = store
        .search(
            &Matcher::expr("env=prod"),
            &SearchOptions::new().on(Column::Meta),
        )
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.records[0].key(), "a");

    // meta patches leave data alone
    let patch = Patch::jsonpath([("env", PatchValue::Set(json!("staging")))]);
    store
        .update(
            &Matcher::key("a"),
            None,
            Some(&patch),
            &SearchOptions::new(),
        )
        .unwrap();
    assert_eq!(
        store.find_meta("a").unwrap().unwrap(),
        json!({"env": "staging"})
    );
    assert_eq!(store.find("a").unwrap().unwrap(), json!({}));
}

#[test]
fn proxy_edits_persist() {
    let store = store();
    let mut view = store
        .create("k1", json!({"profile": {"name": "ada"}}), None, false)
        .unwrap();

    view.set_path("profile.name", json!("grace")).unwrap();
    assert_eq!(
        view.get_path("profile.name").unwrap(),
        Some(json!("grace"))
    );
    assert_eq!(
        store.find("k1").unwrap().unwrap(),
        json!({"profile": {"name": "grace"}})
    );

    view.replace_all(json!({"fresh": 1}), json!({"tag": "t"}))
        .unwrap();
    assert_eq!(store.find("k1").unwrap().unwrap(), json!({"fresh": 1}));
    assert_eq!(store.find_meta("k1").unwrap().unwrap(), json!({"tag": "t"}));

    view.delete().unwrap();
    assert!(store.get("k1").unwrap().is_none());
}

#[test]
fn jsonschema_validation_gates_writes() {
    let schemas = SchemaRegistry::new().with(
        "v1",
        json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}},
            "required": ["n"],
        }),
    );
    let store = Store::open(
        StoreConfig::in_memory()
            .schemas(schemas)
            .default_meta(json!({"schema_type": "jsonschema", "schema_version": "v1"})),
    )
    .unwrap();

    store.add(json!({"n": 1})).unwrap();
    let err = store.add(json!({"n": "one"})).unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { .. }));
    // the rejected write rolled back
    assert_eq!(store.len().unwrap(), 1);

    // updates re-validate the patched document
    let patch = Patch::Replace(json!({"missing_n": true}));
    let err = store
        .update(&Matcher::expr("*"), Some(&patch), None, &SearchOptions::new())
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { .. }));
    assert_eq!(store.count("n=1").unwrap(), 1);
}

#[test]
fn rules_validation_engine() {
    let schemas = SchemaRegistry::new().with(
        "r1",
        json!({
            "name": {"type": "string", "required": true, "minlength": 2},
            "age": {"type": "integer", "min": 0, "max": 150},
        }),
    );
    let store = Store::open(StoreConfig::in_memory().schemas(schemas)).unwrap();
    let meta = json!({"schema_type": "rules", "schema_version": "r1"});

    store
        .create("ok", json!({"name": "ada", "age": 36}), Some(meta.clone()), false)
        .unwrap();
    let err = store
        .create("bad", json!({"name": "x", "age": -1}), Some(meta), false)
        .unwrap_err();
    match err {
        Error::ValidationFailed { engine, .. } => assert_eq!(engine, "rules"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tag_only_meta_skips_validation() {
    let store = store();
    store
        .create("k1", json!({"free": "form"}), Some(json!({"tag": "x"})), false)
        .unwrap();
    assert!(store.get("k1").unwrap().is_some());

    // partial routing is rejected
    let err = store
        .create(
            "k2",
            json!({}),
            Some(json!({"schema_version": "v1"})),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));
}

#[test]
fn force_skips_validation() {
    let schemas = SchemaRegistry::new().with("v1", json!({"type": "integer"}));
    let store = Store::open(
        StoreConfig::in_memory()
            .schemas(schemas)
            .default_meta(json!({"schema_type": "jsonschema", "schema_version": "v1"})),
    )
    .unwrap();

    // smuggle in an invalid record by patching with force
    store.add(json!(1)).unwrap();
    let patch = Patch::Replace(json!("not an integer"));
    store
        .update(
            &Matcher::expr("*"),
            Some(&patch),
            None,
            &SearchOptions::new().force(),
        )
        .unwrap();
    // normal reads now fail validation, forced searches still work
    assert!(store.search(&Matcher::expr("*"), &SearchOptions::new()).is_err());
    let result = store
        .search(&Matcher::expr("*"), &SearchOptions::new().force())
        .unwrap();
    assert_eq!(result.records.len(), 1);
}

#[test]
fn search_multi_combines_equality_maps() {
    let store = store();
    store
        .create("a", json!({"kind": "note", "n": 1}), None, false)
        .unwrap();
    store
        .create("b", json!({"kind": "note", "n": 2}), None, false)
        .unwrap();
    store
        .create("c", json!({"kind": "task", "n": 2}), None, false)
        .unwrap();

    let conditions = vec![
        vec![
            ("kind".to_string(), json!("note")),
            ("n".to_string(), json!(1)),
        ],
        vec![("kind".to_string(), json!("task"))],
    ];
    let result = store
        .search_multi(&conditions, &SearchOptions::new().exact())
        .unwrap();
    let mut keys = result.records.keys();
    keys.sort();
    assert_eq!(keys, ["a", "c"]);
}

#[test]
fn assign_and_remove_conveniences() {
    let store = store();
    assert_eq!(store.assign("k1", json!({"n": 1})).unwrap(), ["k1"]);
    assert_eq!(store.assign("k1", json!({"n": 2})).unwrap(), ["k1"]);
    assert_eq!(store.find("k1").unwrap().unwrap(), json!({"n": 2}));

    store.create("k2", json!({"n": 9}), None, false).unwrap();
    let keys = store.assign("n>1", json!({"n": 0})).unwrap();
    assert_eq!(keys.len(), 2);

    assert_eq!(store.remove("n=0").unwrap(), 2);
    assert!(store.is_empty().unwrap());
}

#[test]
fn registry_shares_handles() {
    let registry = StoreRegistry::new();
    registry.register("main", store());
    registry
        .get("main")
        .unwrap()
        .create("k1", json!({"n": 1}), None, false)
        .unwrap();
    assert_eq!(registry.get("main").unwrap().len().unwrap(), 1);
    assert!(registry.get("other").is_err());
}
