//! Relational database contract.
//!
//! ## Parameter binding
//!
//! Queries use named placeholders (`:name`). The adapter translates them to
//! the backend's native syntax; callers never build positional parameter
//! lists. Values are JSON values and the adapter binds them with the closest
//! native type.
//!
//! ## Atomicity
//!
//! Multi-statement atomicity is available only through
//! [`RelationalDb::execute_transaction`] (all-or-nothing batch) or a scoped
//! [`RelationalTransaction`] handle. No other call sequence is atomic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cloudlift_core::InfrastructureError;

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Named bind parameters for a statement.
pub type SqlParams = BTreeMap<String, Value>;

/// Column definition for `create_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Backend-portable SQL type (e.g. `TEXT`, `BIGINT`, `TIMESTAMPTZ`).
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

/// Column description returned by `get_table_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Scoped transaction handle.
///
/// Dropping the handle without calling [`commit`](Self::commit) rolls the
/// transaction back (adapter-enforced).
#[async_trait]
pub trait RelationalTransaction: Send {
    async fn execute(
        &mut self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError>;

    async fn query(
        &mut self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError>;

    async fn commit(self: Box<Self>) -> Result<(), InfrastructureError>;

    async fn rollback(self: Box<Self>) -> Result<(), InfrastructureError>;
}

/// Abstract relational database.
///
/// Pooled implementations must support concurrent callers: a connection is
/// acquired per call and always released, even on error. Adapters connect
/// lazily on first use if `connect()` was never called.
#[async_trait]
pub trait RelationalDb: Send + Sync {
    /// Establish the connection/pool eagerly. Idempotent.
    async fn connect(&self) -> Result<(), InfrastructureError>;

    /// Close the connection/pool. Safe to call without a prior `connect()`.
    async fn disconnect(&self) -> Result<(), InfrastructureError>;

    /// Run a read statement, returning all rows.
    async fn execute_query(
        &self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError>;

    /// Run a write statement, returning the affected row count.
    async fn execute_command(
        &self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError>;

    /// Run every statement in one transaction. Any failure rolls back the
    /// whole batch and surfaces a `Database` error.
    async fn execute_transaction(
        &self,
        statements: &[(String, SqlParams)],
    ) -> Result<Vec<u64>, InfrastructureError>;

    /// Open a scoped transaction.
    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn RelationalTransaction>, InfrastructureError>;

    /// Create a table if it does not exist.
    async fn create_table(
        &self,
        name: &str,
        columns: &[ColumnDef],
    ) -> Result<(), InfrastructureError>;

    async fn table_exists(&self, name: &str) -> Result<bool, InfrastructureError>;

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>, InfrastructureError>;

    async fn health_check(&self) -> bool;
}
