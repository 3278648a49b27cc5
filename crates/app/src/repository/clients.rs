//! Client persistence.

use std::sync::Arc;

use cloudlift_core::{Client, ClientId, Error};
use cloudlift_interfaces::{ColumnDef, RelationalDb, Row};

use super::{opt_text_column, sql_params, text_column, timestamp_column};

const TABLE: &str = "clients";

const SELECT_COLUMNS: &str = "SELECT id, name, contact_email, industry, created_at FROM clients";

pub struct ClientRepository {
    db: Arc<dyn RelationalDb>,
}

impl ClientRepository {
    pub fn new(db: Arc<dyn RelationalDb>) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.db
            .create_table(
                TABLE,
                &[
                    ColumnDef::new("id", "TEXT").primary_key(),
                    ColumnDef::new("name", "TEXT").not_null(),
                    ColumnDef::new("contact_email", "TEXT").not_null(),
                    ColumnDef::new("industry", "TEXT"),
                    ColumnDef::new("created_at", "TEXT").not_null(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert(&self, client: &Client) -> Result<(), Error> {
        let params = sql_params! {
            "id" => client.id.to_string(),
            "name" => client.name.clone(),
            "contact_email" => client.contact_email.clone(),
            "industry" => client.industry.clone(),
            "created_at" => client.created_at.to_rfc3339(),
        };
        self.db
            .execute_command(
                "INSERT INTO clients (id, name, contact_email, industry, created_at) \
                 VALUES (:id, :name, :contact_email, :industry, :created_at)",
                &params,
            )
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: ClientId) -> Result<Option<Client>, Error> {
        let params = sql_params! { "id" => id.to_string() };
        let rows = self
            .db
            .execute_query(&format!("{SELECT_COLUMNS} WHERE id = :id"), &params)
            .await?;
        rows.first().map(client_from_row).transpose()
    }

    pub async fn list(&self) -> Result<Vec<Client>, Error> {
        let rows = self
            .db
            .execute_query(&format!("{SELECT_COLUMNS} ORDER BY name"), &Default::default())
            .await?;
        rows.iter().map(client_from_row).collect()
    }
}

fn client_from_row(row: &Row) -> Result<Client, Error> {
    Ok(Client {
        id: text_column(row, "id")?.parse::<ClientId>()?,
        name: text_column(row, "name")?.to_string(),
        contact_email: text_column(row, "contact_email")?.to_string(),
        industry: opt_text_column(row, "industry"),
        created_at: timestamp_column(row, "created_at")?,
    })
}
