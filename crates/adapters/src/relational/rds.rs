//! AWS RDS adapter: the Postgres engine with a cloud connection profile.
//!
//! Same wire behavior as [`PostgresAdapter`]; differs only in defaults (TLS
//! required, larger pool) and in the config keys it documents. Kept as a
//! distinct type so `adapters.relational_db.type = "RdsAdapter"` selects the
//! cloud profile explicitly.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    ColumnDef, ColumnInfo, RelationalDb, RelationalTransaction, Row, SqlParams,
};

use crate::config_map::AdapterConfig;

use super::postgres::PostgresAdapter;

#[derive(Debug)]
pub struct RdsAdapter {
    inner: PostgresAdapter,
}

impl RdsAdapter {
    /// Defaults differ from the local adapter: `ssl_required` true,
    /// `connection_pool_size` 10, `connection_timeout_secs` 20.
    pub fn from_config(cfg: &AdapterConfig) -> Self {
        let mut section: Map<String, Value> = Map::new();
        for key in ["host", "port", "username", "password", "database"] {
            if let Some(v) = cfg.get(key) {
                section.insert(key.to_string(), v.clone());
            }
        }
        section.insert("ssl_required".into(), json!(cfg.bool_or("ssl_required", true)));
        section.insert(
            "connection_pool_size".into(),
            json!(cfg.u64_or("connection_pool_size", 10)),
        );
        section.insert(
            "connection_timeout_secs".into(),
            json!(cfg.u64_or("connection_timeout_secs", 20)),
        );
        Self {
            inner: PostgresAdapter::from_config(&AdapterConfig::new(section)),
        }
    }
}

#[async_trait]
impl RelationalDb for RdsAdapter {
    async fn connect(&self) -> Result<(), InfrastructureError> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), InfrastructureError> {
        self.inner.disconnect().await
    }

    async fn execute_query(
        &self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError> {
        self.inner.execute_query(query, params).await
    }

    async fn execute_command(
        &self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError> {
        self.inner.execute_command(command, params).await
    }

    async fn execute_transaction(
        &self,
        statements: &[(String, SqlParams)],
    ) -> Result<Vec<u64>, InfrastructureError> {
        self.inner.execute_transaction(statements).await
    }

    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn RelationalTransaction>, InfrastructureError> {
        self.inner.begin_transaction().await
    }

    async fn create_table(
        &self,
        name: &str,
        columns: &[ColumnDef],
    ) -> Result<(), InfrastructureError> {
        self.inner.create_table(name, columns).await
    }

    async fn table_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        self.inner.table_exists(name).await
    }

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>, InfrastructureError> {
        self.inner.get_table_schema(name).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
