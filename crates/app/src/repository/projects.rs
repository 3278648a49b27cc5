//! Project persistence.

use std::sync::Arc;

use cloudlift_core::{ClientId, Error, Project, ProjectId, ProjectStatus};
use cloudlift_interfaces::{ColumnDef, RelationalDb, Row};

use super::{sql_params, text_column, timestamp_column};

const TABLE: &str = "projects";

const SELECT_COLUMNS: &str =
    "SELECT id, client_id, name, description, status, created_at, updated_at FROM projects";

pub struct ProjectRepository {
    db: Arc<dyn RelationalDb>,
}

impl ProjectRepository {
    pub fn new(db: Arc<dyn RelationalDb>) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.db
            .create_table(
                TABLE,
                &[
                    ColumnDef::new("id", "TEXT").primary_key(),
                    ColumnDef::new("client_id", "TEXT").not_null(),
                    ColumnDef::new("name", "TEXT").not_null(),
                    ColumnDef::new("description", "TEXT").not_null(),
                    ColumnDef::new("status", "TEXT").not_null(),
                    ColumnDef::new("created_at", "TEXT").not_null(),
                    ColumnDef::new("updated_at", "TEXT").not_null(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert(&self, project: &Project) -> Result<(), Error> {
        let params = sql_params! {
            "id" => project.id.to_string(),
            "client_id" => project.client_id.to_string(),
            "name" => project.name.clone(),
            "description" => project.description.clone(),
            "status" => project.status.as_str(),
            "created_at" => project.created_at.to_rfc3339(),
            "updated_at" => project.updated_at.to_rfc3339(),
        };
        self.db
            .execute_command(
                "INSERT INTO projects (id, client_id, name, description, status, created_at, updated_at) \
                 VALUES (:id, :client_id, :name, :description, :status, :created_at, :updated_at)",
                &params,
            )
            .await?;
        Ok(())
    }

    pub async fn update(&self, project: &Project) -> Result<(), Error> {
        let params = sql_params! {
            "id" => project.id.to_string(),
            "name" => project.name.clone(),
            "description" => project.description.clone(),
            "status" => project.status.as_str(),
            "updated_at" => project.updated_at.to_rfc3339(),
        };
        self.db
            .execute_command(
                "UPDATE projects SET name = :name, description = :description, \
                 status = :status, updated_at = :updated_at WHERE id = :id",
                &params,
            )
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: ProjectId) -> Result<Option<Project>, Error> {
        let params = sql_params! { "id" => id.to_string() };
        let rows = self
            .db
            .execute_query(&format!("{SELECT_COLUMNS} WHERE id = :id"), &params)
            .await?;
        rows.first().map(project_from_row).transpose()
    }

    pub async fn list(&self, client_id: Option<ClientId>) -> Result<Vec<Project>, Error> {
        let rows = match client_id {
            Some(client_id) => {
                let params = sql_params! { "client_id" => client_id.to_string() };
                self.db
                    .execute_query(
                        &format!("{SELECT_COLUMNS} WHERE client_id = :client_id ORDER BY created_at"),
                        &params,
                    )
                    .await?
            }
            None => {
                self.db
                    .execute_query(
                        &format!("{SELECT_COLUMNS} ORDER BY created_at"),
                        &Default::default(),
                    )
                    .await?
            }
        };
        rows.iter().map(project_from_row).collect()
    }

    /// Case-insensitive substring search over name and description.
    pub async fn search(&self, term: &str) -> Result<Vec<Project>, Error> {
        let params = sql_params! {
            "pattern" => format!("%{}%", term.to_lowercase()),
        };
        let rows = self
            .db
            .execute_query(
                &format!(
                    "{SELECT_COLUMNS} WHERE LOWER(name) LIKE :pattern \
                     OR LOWER(description) LIKE :pattern ORDER BY created_at"
                ),
                &params,
            )
            .await?;
        rows.iter().map(project_from_row).collect()
    }
}

fn project_from_row(row: &Row) -> Result<Project, Error> {
    Ok(Project {
        id: text_column(row, "id")?.parse::<ProjectId>()?,
        client_id: text_column(row, "client_id")?.parse::<ClientId>()?,
        name: text_column(row, "name")?.to_string(),
        description: text_column(row, "description")?.to_string(),
        status: ProjectStatus::parse(text_column(row, "status")?)?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRelationalDb;
    use cloudlift_core::ClientId;

    fn repo() -> ProjectRepository {
        ProjectRepository::new(Arc::new(FakeRelationalDb::new()))
    }

    fn project(name: &str, description: &str) -> Project {
        Project::new(ProjectId::new(), ClientId::new(), name, description).unwrap()
    }

    #[tokio::test]
    async fn insert_then_fetch_round_trips() {
        let repo = repo();
        let p = project("Datacenter exit", "lift and shift wave 1");
        repo.insert(&p).await.unwrap();
        let found = repo.fetch(p.id).await.unwrap().unwrap();
        assert_eq!(found, p);
    }

    #[tokio::test]
    async fn fetch_missing_returns_none() {
        assert!(repo().fetch(ProjectId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_persists_changes() {
        let repo = repo();
        let mut p = project("before", "");
        repo.insert(&p).await.unwrap();
        p.update("after", "updated").unwrap();
        repo.update(&p).await.unwrap();
        let found = repo.fetch(p.id).await.unwrap().unwrap();
        assert_eq!(found.name, "after");
        assert_eq!(found.description, "updated");
    }

    #[tokio::test]
    async fn list_filters_by_client() {
        let repo = repo();
        let mine = project("mine", "");
        let other = project("other", "");
        repo.insert(&mine).await.unwrap();
        repo.insert(&other).await.unwrap();

        let all = repo.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let filtered = repo.list(Some(mine.client_id)).await.unwrap();
        assert_eq!(filtered, vec![mine]);
    }

    #[tokio::test]
    async fn search_matches_name_and_description_case_insensitively() {
        let repo = repo();
        let by_name = project("Mainframe Rehost", "");
        let by_description = project("Wave 2", "includes the MAINFRAME estate");
        let unrelated = project("CRM migration", "saas replatform");
        for p in [&by_name, &by_description, &unrelated] {
            repo.insert(p).await.unwrap();
        }

        let hits = repo.search("mainframe").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&by_name));
        assert!(hits.contains(&by_description));
    }
}
