//! End-to-end wiring: configuration files in, working storages out.

use std::fs;
use std::path::Path;

use cairn::{bootstrap, ConfigLoader, ErrorKind, FileSystemStorage, Key, State, Value};
use serde_json::json;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

#[tokio::test]
async fn layered_files_with_env_references() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::env::set_var("CAIRN_WIRING_ROOT", &data);

    write(
        dir.path(),
        "base.json",
        r#"{
            "d": {"g": 1},
            "storage": {"kind": "fs", "path": "$CAIRN_WIRING_ROOT", "format": "json"}
        }"#,
    );
    write(dir.path(), "override.yaml", "d.g.r!: 4\nstorage.format: yaml\n");

    let loader = ConfigLoader::new().with_search_dirs([dir.path()]);
    let context = bootstrap(&loader, ["base.json", "override.yaml"]).unwrap();

    assert_eq!(context.config().get("d.g.r"), Some(&json!(4)));
    assert_eq!(
        context.config().get("storage.path"),
        Some(&json!(data.to_str().unwrap()))
    );
    assert_eq!(context.state("storage"), Some(State::Uninitialized));

    let storage = context.resolve("storage").await.unwrap();
    assert_eq!(context.state("storage"), Some(State::Ready));
    storage
        .set(&Key::from("doc"), Some(Value::from_json(json!({"a": [1, 2]}))))
        .await
        .unwrap();
    let raw = fs::read_to_string(data.join("doc")).unwrap();
    assert!(raw.contains("a:"), "stored as yaml: {}", raw);

    context.shutdown().await.unwrap();
    assert_eq!(context.state("storage"), Some(State::Stopped));
}

#[tokio::test]
async fn cache_over_filesystem_source() {
    let dir = tempfile::tempdir().unwrap();
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({
            "cache": {"kind": "meta.cache", "storage": "memory", "source": "disk"},
            "memory": {"kind": "memory"},
            "disk": {"kind": "fs", "path": dir.path().to_str().unwrap(), "format": "json"},
        })],
    )
    .unwrap();

    let disk = context.resolve("disk").await.unwrap();
    let key = Key::from(("users", "42"));
    disk.set(&key, Some(Value::from("alice"))).await.unwrap();

    let cache = context.resolve("cache").await.unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from("alice")));

    // The value now lives in memory; removing the file does not matter.
    fs::remove_file(dir.path().join("users/42")).unwrap();
    assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from("alice")));
    context.shutdown().await.unwrap();
}

#[tokio::test]
async fn replicated_filesystems() {
    let dir = tempfile::tempdir().unwrap();
    let root = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({
            "replicas": {"kind": "meta.replicator", "storages": ["r1", "r2"]},
            "r1": {"kind": "fs", "path": root("r1"), "format": "json"},
            "r2": {"kind": "fs.hash", "path": root("r2"), "format": "json"},
        })],
    )
    .unwrap();

    let replicas = context.resolve("replicas").await.unwrap();
    let key = Key::from("k");
    replicas.set(&key, Some(Value::from(7))).await.unwrap();
    for _ in 0..4 {
        assert_eq!(replicas.get(&key).await.unwrap(), Some(Value::from(7)));
    }
    assert!(dir.path().join("r1/k").is_file());

    let r2 = context.resolve("r2").await.unwrap();
    let sharded = r2.raw_key(&key).unwrap();
    assert_eq!(sharded.len(), 3);
    assert!(sharded.to_path(&dir.path().join("r2")).is_file());

    replicas.set(&key, None).await.unwrap();
    assert_eq!(context.resolve("r1").await.unwrap().get(&key).await.unwrap(), None);
    assert_eq!(r2.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn fallback_prefers_earlier_storages() {
    let dir = tempfile::tempdir().unwrap();
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({
            "any": {"kind": "meta.fallback", "storages": ["hot", "cold"]},
            "hot": {"kind": "memory"},
            "cold": {"kind": "fs", "path": dir.path().to_str().unwrap(), "format": "str"},
        })],
    )
    .unwrap();
    let cold = context.resolve("cold").await.unwrap();
    cold.set(&Key::from("k"), Some(Value::from("cold"))).await.unwrap();

    let any = context.resolve("any").await.unwrap();
    assert_eq!(any.get(&Key::from("k")).await.unwrap(), Some(Value::from("cold")));

    let hot = context.resolve("hot").await.unwrap();
    hot.set(&Key::from("k"), Some(Value::from("hot"))).await.unwrap();
    assert_eq!(any.get(&Key::from("k")).await.unwrap(), Some(Value::from("hot")));
}

#[tokio::test]
async fn cross_storage_moves_keep_values() {
    let dir = tempfile::tempdir().unwrap();
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({
            "inbox": {"kind": "fs", "path": dir.path().join("inbox").to_str().unwrap(), "format": "json"},
            "archive": {"kind": "fs", "path": dir.path().join("archive").to_str().unwrap(), "format": "yaml"},
        })],
    )
    .unwrap();
    let inbox = context.resolve("inbox").await.unwrap();
    let archive = context.resolve("archive").await.unwrap();
    let key = Key::from("msg");
    inbox
        .set(&key, Some(Value::from_json(json!({"subject": "hi"}))))
        .await
        .unwrap();

    assert!(inbox.move_to(&key, archive.as_ref(), &key).await.unwrap());
    assert_eq!(inbox.get(&key).await.unwrap(), None);
    assert_eq!(
        archive.get(&key).await.unwrap(),
        Some(Value::from_json(json!({"subject": "hi"})))
    );

    let fs = archive
        .as_any()
        .downcast_ref::<FileSystemStorage>()
        .expect("plain fs storage");
    assert_eq!(fs.root(), dir.path().join("archive"));
}

#[tokio::test]
async fn configuration_mistakes_surface_at_resolution() {
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({
            "a": {"kind": "meta.cache", "storage": "b", "source": "m"},
            "b": {"kind": "meta.cache", "storage": "a", "source": "m"},
            "m": {"kind": "memory"},
            "odd": {"kind": "nope"},
        })],
    )
    .unwrap();

    let err = context.resolve("a").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("a -> b -> a"), "{}", err);

    let err = context.resolve("odd").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);

    let err = context.resolve("missing").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);

    // Healthy components are unaffected.
    assert!(context.resolve("m").await.is_ok());
}

#[tokio::test]
async fn unknown_formatter_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let context = bootstrap(
        &ConfigLoader::new(),
        [json!({"s": {"kind": "fs", "path": dir.path().to_str().unwrap(), "format": "json|zip"}})],
    )
    .unwrap();
    let err = context.resolve("s").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}
