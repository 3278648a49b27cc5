//! PostgreSQL adapter over a sqlx connection pool.
//!
//! Concurrency: every call acquires a pooled connection and releases it when
//! the call returns, error paths included — callers never manage the pool.
//! The pool itself is created lazily on first use (or eagerly via
//! `connect()`).
//!
//! Ordering: no guarantee across concurrent calls beyond Postgres's own
//! transaction isolation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo, postgres::PgRow};
use tokio::sync::OnceCell;
use tracing::instrument;
use uuid::Uuid;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    ColumnDef, ColumnInfo, RelationalDb, RelationalTransaction, Row, SqlParams,
};

use crate::config_map::AdapterConfig;

use super::params::translate_named_params;

const DATABASE_TYPE: &str = "postgresql";

/// sqlx-backed Postgres implementation of [`RelationalDb`].
#[derive(Debug)]
pub struct PostgresAdapter {
    options: PgConnectOptions,
    pool_size: u32,
    acquire_timeout: Duration,
    pool: OnceCell<PgPool>,
}

impl PostgresAdapter {
    /// Build from a config section. Every key has a local-development
    /// default: `host` (localhost), `port` (5432), `username`/`password`
    /// (postgres), `database` (cloudlift), `connection_pool_size` (5),
    /// `connection_timeout_secs` (10), `ssl_required` (false).
    pub fn from_config(cfg: &AdapterConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&cfg.str_or("host", "localhost"))
            .port(cfg.u64_or("port", 5432) as u16)
            .username(&cfg.str_or("username", "postgres"))
            .password(&cfg.str_or("password", "postgres"))
            .database(&cfg.str_or("database", "cloudlift"))
            .ssl_mode(if cfg.bool_or("ssl_required", false) {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        Self {
            options,
            pool_size: cfg.u32_or("connection_pool_size", 5),
            acquire_timeout: Duration::from_secs(cfg.u64_or("connection_timeout_secs", 10)),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&PgPool, InfrastructureError> {
        self.pool
            .get_or_try_init(|| async {
                PgPoolOptions::new()
                    .max_connections(self.pool_size)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(self.options.clone())
                    .await
                    .map_err(|e| wrap_error("connect", None, e))
            })
            .await
    }
}

#[async_trait]
impl RelationalDb for PostgresAdapter {
    async fn connect(&self) -> Result<(), InfrastructureError> {
        self.pool().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), InfrastructureError> {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
        Ok(())
    }

    #[instrument(skip(self, params), err)]
    async fn execute_query(
        &self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError> {
        let pool = self.pool().await?;
        let (sql, names) = translate_named_params(query);
        let rows = bind_all(sqlx::query(&sql), &names, params, query)?
            .fetch_all(pool)
            .await
            .map_err(|e| wrap_error("execute_query", Some(query), e))?;
        rows.iter().map(row_to_json).collect()
    }

    #[instrument(skip(self, params), err)]
    async fn execute_command(
        &self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError> {
        let pool = self.pool().await?;
        let (sql, names) = translate_named_params(command);
        let result = bind_all(sqlx::query(&sql), &names, params, command)?
            .execute(pool)
            .await
            .map_err(|e| wrap_error("execute_command", Some(command), e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, statements), fields(statements = statements.len()), err)]
    async fn execute_transaction(
        &self,
        statements: &[(String, SqlParams)],
    ) -> Result<Vec<u64>, InfrastructureError> {
        let pool = self.pool().await?;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| wrap_error("execute_transaction", None, e))?;

        let mut affected = Vec::with_capacity(statements.len());
        for (command, params) in statements {
            let (sql, names) = translate_named_params(command);
            let result = bind_all(sqlx::query(&sql), &names, params, command)?
                .execute(&mut *tx)
                .await;
            match result {
                Ok(r) => affected.push(r.rows_affected()),
                Err(e) => {
                    // Any failure rolls back every statement in the batch.
                    tx.rollback()
                        .await
                        .map_err(|e| wrap_error("rollback", None, e))?;
                    return Err(wrap_error("execute_transaction", Some(command), e));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| wrap_error("commit", None, e))?;
        Ok(affected)
    }

    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn RelationalTransaction>, InfrastructureError> {
        let pool = self.pool().await?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| wrap_error("begin_transaction", None, e))?;
        Ok(Box::new(PgTransactionHandle { tx: Some(tx) }))
    }

    #[instrument(skip(self, columns), err)]
    async fn create_table(
        &self,
        name: &str,
        columns: &[ColumnDef],
    ) -> Result<(), InfrastructureError> {
        let mut parts: Vec<String> = Vec::with_capacity(columns.len() + 1);
        let mut pk: Vec<String> = Vec::new();
        for col in columns {
            let mut part = format!("{} {}", quote_ident(&col.name)?, col.data_type);
            if !col.nullable {
                part.push_str(" NOT NULL");
            }
            parts.push(part);
            if col.primary_key {
                pk.push(quote_ident(&col.name)?);
            }
        }
        if !pk.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(name)?,
            parts.join(", ")
        );
        let pool = self.pool().await?;
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|e| wrap_error("create_table", Some(&sql), e))?;
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1) AS present",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| wrap_error("table_exists", None, e))?;
        row.try_get::<bool, _>("present")
            .map_err(|e| wrap_error("table_exists", None, e))
    }

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>, InfrastructureError> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(name)
        .fetch_all(pool)
        .await
        .map_err(|e| wrap_error("get_table_schema", None, e))?;

        rows.into_iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row
                        .try_get("column_name")
                        .map_err(|e| wrap_error("get_table_schema", None, e))?,
                    data_type: row
                        .try_get("data_type")
                        .map_err(|e| wrap_error("get_table_schema", None, e))?,
                    nullable: row
                        .try_get::<String, _>("is_nullable")
                        .map(|v| v == "YES")
                        .map_err(|e| wrap_error("get_table_schema", None, e))?,
                    default: row
                        .try_get("column_default")
                        .map_err(|e| wrap_error("get_table_schema", None, e))?,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> bool {
        match self.pool().await {
            Ok(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            Err(_) => false,
        }
    }
}

/// Scoped transaction over a dedicated pooled connection. Dropping the
/// handle without `commit()` rolls back (sqlx semantics).
struct PgTransactionHandle {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransactionHandle {
    fn tx(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>, InfrastructureError> {
        self.tx.as_mut().ok_or_else(|| {
            InfrastructureError::database(DATABASE_TYPE, "transaction", "transaction already finished")
        })
    }
}

#[async_trait]
impl RelationalTransaction for PgTransactionHandle {
    async fn execute(
        &mut self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError> {
        let (sql, names) = translate_named_params(command);
        let query = bind_all(sqlx::query(&sql), &names, params, command)?;
        let tx = self.tx()?;
        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|e| wrap_error("transaction_execute", Some(command), e))?;
        Ok(result.rows_affected())
    }

    async fn query(
        &mut self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError> {
        let (sql, names) = translate_named_params(query);
        let prepared = bind_all(sqlx::query(&sql), &names, params, query)?;
        let tx = self.tx()?;
        let rows = prepared
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| wrap_error("transaction_query", Some(query), e))?;
        rows.iter().map(row_to_json).collect()
    }

    async fn commit(mut self: Box<Self>) -> Result<(), InfrastructureError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(|e| wrap_error("commit", None, e))?;
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), InfrastructureError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .map_err(|e| wrap_error("rollback", None, e))?;
        }
        Ok(())
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

/// Bind named parameter values in positional order. Scalars bind as native
/// types; arrays/objects bind as jsonb. A referenced-but-missing parameter
/// is a caller bug and surfaces as a `Database` error.
fn bind_all<'q>(
    mut query: PgQuery<'q>,
    names: &[String],
    params: &SqlParams,
    original: &str,
) -> Result<PgQuery<'q>, InfrastructureError> {
    for name in names {
        let value = params.get(name).ok_or_else(|| InfrastructureError::Database {
            database_type: DATABASE_TYPE.into(),
            operation: "bind".into(),
            message: format!("missing value for parameter ':{name}'"),
            query: Some(original.to_string()),
            source: None,
        })?;
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else {
                    query.bind(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.clone()),
        };
    }
    Ok(query)
}

/// Project a sqlx row into a column-name -> JSON map. Unrecognized column
/// types fall back to their text rendering.
fn row_to_json(row: &PgRow) -> Result<Row, InfrastructureError> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let type_name = column.type_info().name().to_uppercase();
        let value = match type_name.as_str() {
            "BOOL" => json_from(row.try_get::<Option<bool>, _>(i), Value::from)?,
            "INT2" => json_from(row.try_get::<Option<i16>, _>(i), |v| Value::from(i64::from(v)))?,
            "INT4" => json_from(row.try_get::<Option<i32>, _>(i), |v| Value::from(i64::from(v)))?,
            "INT8" => json_from(row.try_get::<Option<i64>, _>(i), Value::from)?,
            "FLOAT4" => json_from(row.try_get::<Option<f32>, _>(i), |v| Value::from(f64::from(v)))?,
            "FLOAT8" => json_from(row.try_get::<Option<f64>, _>(i), Value::from)?,
            "UUID" => json_from(row.try_get::<Option<Uuid>, _>(i), |v| {
                Value::String(v.to_string())
            })?,
            "TIMESTAMPTZ" => json_from(row.try_get::<Option<DateTime<Utc>>, _>(i), |v| {
                Value::String(v.to_rfc3339())
            })?,
            "JSON" | "JSONB" => json_from(row.try_get::<Option<Value>, _>(i), |v| v)?,
            _ => match row.try_get::<Option<String>, _>(i) {
                Ok(Some(s)) => Value::String(s),
                Ok(None) => Value::Null,
                Err(_) => Value::Null,
            },
        };
        out.insert(name, value);
    }
    Ok(out)
}

fn json_from<T>(
    result: Result<Option<T>, sqlx::Error>,
    to_value: impl FnOnce(T) -> Value,
) -> Result<Value, InfrastructureError> {
    result
        .map(|opt| opt.map(to_value).unwrap_or(Value::Null))
        .map_err(|e| wrap_error("decode_row", None, e))
}

/// Validate and quote a SQL identifier. Rejects anything outside
/// `[A-Za-z0-9_]` so config/caller strings cannot smuggle SQL.
fn quote_ident(name: &str) -> Result<String, InfrastructureError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(InfrastructureError::database(
            DATABASE_TYPE,
            "quote_ident",
            format!("invalid identifier '{name}'"),
        ));
    }
    Ok(format!("\"{name}\""))
}

fn wrap_error(operation: &str, query: Option<&str>, e: sqlx::Error) -> InfrastructureError {
    InfrastructureError::Database {
        database_type: DATABASE_TYPE.into(),
        operation: operation.into(),
        message: e.to_string(),
        query: query.map(str::to_string),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_rejects_injection() {
        assert!(quote_ident("projects").is_ok());
        assert!(quote_ident("drop table; --").is_err());
        assert!(quote_ident("").is_err());
    }

    #[test]
    fn constructs_from_empty_config() {
        // Local-dev defaults only; no connection is made until first use.
        let adapter = PostgresAdapter::from_config(&AdapterConfig::empty());
        assert_eq!(adapter.pool_size, 5);
    }
}
