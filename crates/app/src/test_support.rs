//! In-memory `RelationalDb` used by the crate's unit tests.
//!
//! Interprets just enough of the repositories' fixed statements to act as a
//! row store: INSERT appends the params as a row, UPDATE/DELETE match on the
//! `id` param, SELECT filters rows by equality on every bound param (the
//! `pattern` param is treated as the repositories' lowercase substring
//! search over `name`/`description`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{
    ColumnDef, ColumnInfo, RelationalDb, RelationalTransaction, Row, SqlParams,
};

#[derive(Default)]
pub struct FakeRelationalDb {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl FakeRelationalDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut HashMap<String, Vec<Row>>) -> T) -> T {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut tables)
    }
}

fn token_after<'a>(sql: &'a str, keyword: &str) -> Result<&'a str, InfrastructureError> {
    let mut words = sql.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case(keyword) {
            return words.next().ok_or_else(|| unsupported(sql));
        }
    }
    Err(unsupported(sql))
}

fn unsupported(sql: &str) -> InfrastructureError {
    InfrastructureError::database("fake", "execute", format!("unsupported statement: {sql}"))
}

fn matches_pattern(row: &Row, pattern: &str) -> bool {
    let needle = pattern.trim_matches('%');
    ["name", "description"].iter().any(|col| {
        row.get(*col)
            .and_then(Value::as_str)
            .is_some_and(|v| v.to_lowercase().contains(needle))
    })
}

fn matches_params(row: &Row, params: &SqlParams) -> bool {
    params.iter().all(|(key, expected)| match key.as_str() {
        "pattern" => expected
            .as_str()
            .is_some_and(|pattern| matches_pattern(row, pattern)),
        _ => row.get(key) == Some(expected),
    })
}

#[async_trait]
impl RelationalDb for FakeRelationalDb {
    async fn connect(&self) -> Result<(), InfrastructureError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), InfrastructureError> {
        Ok(())
    }

    async fn execute_query(
        &self,
        query: &str,
        params: &SqlParams,
    ) -> Result<Vec<Row>, InfrastructureError> {
        let table = token_after(query, "FROM")?.to_string();
        let order_by_created = query.to_lowercase().contains("order by created_at");
        self.with_tables(|tables| {
            let mut rows: Vec<Row> = tables
                .get(&table)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .filter(|row| matches_params(row, params))
                .cloned()
                .collect();
            if order_by_created {
                rows.sort_by(|a, b| {
                    let at = |row: &Row| {
                        row.get("created_at").and_then(Value::as_str).map(str::to_string)
                    };
                    at(a).cmp(&at(b))
                });
            }
            Ok(rows)
        })
    }

    async fn execute_command(
        &self,
        command: &str,
        params: &SqlParams,
    ) -> Result<u64, InfrastructureError> {
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        match verb.as_str() {
            "INSERT" => {
                let table = token_after(command, "INTO")?.to_string();
                self.with_tables(|tables| {
                    let row: Row = params
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    tables.entry(table).or_default().push(row);
                    Ok(1)
                })
            }
            "UPDATE" => {
                let table = token_after(command, "UPDATE")?.to_string();
                let id = params.get("id").cloned().ok_or_else(|| unsupported(command))?;
                self.with_tables(|tables| {
                    let mut changed = 0;
                    for row in tables.entry(table).or_default() {
                        if row.get("id") == Some(&id) {
                            for (key, value) in params {
                                if key != "id" {
                                    row.insert(key.clone(), value.clone());
                                }
                            }
                            changed += 1;
                        }
                    }
                    Ok(changed)
                })
            }
            "DELETE" => {
                let table = token_after(command, "FROM")?.to_string();
                let id = params.get("id").cloned().ok_or_else(|| unsupported(command))?;
                self.with_tables(|tables| {
                    let rows = tables.entry(table).or_default();
                    let before = rows.len();
                    rows.retain(|row| row.get("id") != Some(&id));
                    Ok((before - rows.len()) as u64)
                })
            }
            _ => Err(unsupported(command)),
        }
    }

    async fn execute_transaction(
        &self,
        statements: &[(String, SqlParams)],
    ) -> Result<Vec<u64>, InfrastructureError> {
        let mut counts = Vec::with_capacity(statements.len());
        for (statement, params) in statements {
            counts.push(self.execute_command(statement, params).await?);
        }
        Ok(counts)
    }

    async fn begin_transaction(
        &self,
    ) -> Result<Box<dyn RelationalTransaction>, InfrastructureError> {
        Err(unsupported("BEGIN"))
    }

    async fn create_table(
        &self,
        name: &str,
        _columns: &[ColumnDef],
    ) -> Result<(), InfrastructureError> {
        self.with_tables(|tables| {
            tables.entry(name.to_string()).or_default();
        });
        Ok(())
    }

    async fn table_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        Ok(self.with_tables(|tables| tables.contains_key(name)))
    }

    async fn get_table_schema(&self, name: &str) -> Result<Vec<ColumnInfo>, InfrastructureError> {
        let _ = name;
        Ok(Vec::new())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
