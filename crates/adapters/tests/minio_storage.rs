//! MinIO integration tests. Gated: they run only when
//! `CLOUDLIFT_TEST_MINIO=1` and a local MinIO accepts the `MinioAdapter`
//! defaults (`http://localhost:9000`, `minioadmin`/`minioadmin`, bucket
//! `cloudlift`).

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::json;
use uuid::Uuid;

use cloudlift_adapters::AdapterConfig;
use cloudlift_adapters::storage::MinioAdapter;
use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::ObjectStorage;

fn gated() -> bool {
    std::env::var("CLOUDLIFT_TEST_MINIO").is_ok_and(|v| v == "1")
}

fn adapter() -> MinioAdapter {
    let cfg = AdapterConfig::new(
        json!({
            "endpoint": std::env::var("CLOUDLIFT_MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    );
    MinioAdapter::from_config(&cfg).unwrap()
}

fn unique_key(scenario: &str) -> String {
    format!("it/{scenario}/{}", Uuid::now_v7())
}

#[tokio::test]
async fn put_get_delete_scenario() {
    if !gated() {
        return;
    }
    let storage = adapter();
    let key = unique_key("round-trip");
    let mut meta = BTreeMap::new();
    meta.insert("project".to_string(), "dc-exit".to_string());

    storage
        .put_object(
            &key,
            Bytes::from_static(b"server,cpu,ram\nweb-01,4,16\n"),
            Some("text/csv"),
            Some(&meta),
        )
        .await
        .unwrap();

    assert!(storage.object_exists(&key).await.unwrap());
    let body = storage.get_object(&key).await.unwrap();
    assert!(body.starts_with(b"server,cpu,ram"));

    let info = storage.get_object_metadata(&key).await.unwrap();
    assert_eq!(info.size, body.len() as u64);
    assert_eq!(info.content_type.as_deref(), Some("text/csv"));

    let streamed: Vec<Bytes> = storage
        .get_object_stream(&key)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed.concat(), body);

    storage.delete_object(&key).await.unwrap();
    assert!(!storage.object_exists(&key).await.unwrap());
}

#[tokio::test]
async fn missing_object_is_object_not_found() {
    if !gated() {
        return;
    }
    let storage = adapter();
    let key = unique_key("missing");

    let err = storage.get_object(&key).await.unwrap_err();
    match err {
        InfrastructureError::ObjectNotFound { key: reported, .. } => {
            assert_eq!(reported, key);
        }
        other => panic!("expected ObjectNotFound, got {other}"),
    }

    // Deleting an absent key is not an error.
    storage.delete_object(&key).await.unwrap();
}

#[tokio::test]
async fn list_respects_prefix_and_limit() {
    if !gated() {
        return;
    }
    let storage = adapter();
    let prefix = format!("it/list/{}", Uuid::now_v7());
    for name in ["a", "b", "c"] {
        storage
            .put_object(
                &format!("{prefix}/{name}"),
                Bytes::from_static(b"x"),
                None,
                None,
            )
            .await
            .unwrap();
    }

    let limited = storage.list_objects(Some(&prefix), Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    let all = storage.list_objects(Some(&prefix), None).await.unwrap();
    assert_eq!(all.len(), 3);
    let keys: Vec<_> = all.iter().map(|m| m.key.as_str()).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);

    for meta in all {
        storage.delete_object(&meta.key).await.unwrap();
    }
}
