//! Postgres integration tests. Gated: they run only when
//! `CLOUDLIFT_TEST_POSTGRES=1` and a local Postgres accepts the
//! `PostgresAdapter` defaults (or the `CLOUDLIFT_DB_*` overrides).

use serde_json::json;

use cloudlift_adapters::AdapterConfig;
use cloudlift_adapters::relational::PostgresAdapter;
use cloudlift_interfaces::{ColumnDef, RelationalDb, SqlParams};

fn gated() -> bool {
    std::env::var("CLOUDLIFT_TEST_POSTGRES").is_ok_and(|v| v == "1")
}

fn adapter() -> PostgresAdapter {
    let cfg = AdapterConfig::new(
        json!({
            "host": std::env::var("CLOUDLIFT_DB_HOST").unwrap_or_else(|_| "localhost".into()),
            "database": std::env::var("CLOUDLIFT_DB_NAME").unwrap_or_else(|_| "cloudlift".into()),
        })
        .as_object()
        .cloned()
        .unwrap_or_default(),
    );
    PostgresAdapter::from_config(&cfg)
}

fn params(id: &str) -> SqlParams {
    let mut p = SqlParams::new();
    p.insert("id".into(), json!(id));
    p
}

async fn fresh_table(db: &PostgresAdapter, name: &str) {
    db.execute_command(&format!("DROP TABLE IF EXISTS {name}"), &SqlParams::new())
        .await
        .unwrap();
    db.create_table(name, &[ColumnDef::new("id", "TEXT").primary_key()])
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_batch_rolls_back_every_statement() {
    if !gated() {
        return;
    }
    let db = adapter();
    fresh_table(&db, "tx_rollback_batch").await;

    let statements = vec![
        (
            "INSERT INTO tx_rollback_batch (id) VALUES (:id)".to_string(),
            params("a"),
        ),
        (
            "INSERT INTO missing_table (id) VALUES (:id)".to_string(),
            params("b"),
        ),
    ];
    let err = db.execute_transaction(&statements).await.unwrap_err();
    assert!(err.to_string().contains("missing_table") || !err.to_string().is_empty());

    let rows = db
        .execute_query("SELECT id FROM tx_rollback_batch", &SqlParams::new())
        .await
        .unwrap();
    assert!(rows.is_empty(), "first insert must have been rolled back");
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn dropped_transaction_handle_rolls_back() {
    if !gated() {
        return;
    }
    let db = adapter();
    fresh_table(&db, "tx_rollback_scoped").await;

    {
        let mut tx = db.begin_transaction().await.unwrap();
        tx.execute(
            "INSERT INTO tx_rollback_scoped (id) VALUES (:id)",
            &params("a"),
        )
        .await
        .unwrap();
        // dropped without commit
    }

    let rows = db
        .execute_query("SELECT id FROM tx_rollback_scoped", &SqlParams::new())
        .await
        .unwrap();
    assert!(rows.is_empty());
    db.disconnect().await.unwrap();
}

#[tokio::test]
async fn committed_transaction_persists() {
    if !gated() {
        return;
    }
    let db = adapter();
    fresh_table(&db, "tx_commit").await;

    let mut tx = db.begin_transaction().await.unwrap();
    tx.execute("INSERT INTO tx_commit (id) VALUES (:id)", &params("a"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let rows = db
        .execute_query("SELECT id FROM tx_commit", &SqlParams::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    db.disconnect().await.unwrap();
}
