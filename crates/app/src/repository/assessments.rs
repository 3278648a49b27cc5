//! Assessment persistence.
//!
//! `document_keys` is a JSON-encoded string array in a TEXT column; the list
//! is always read and written whole, never queried into.

use std::sync::Arc;

use cloudlift_core::{Assessment, AssessmentId, AssessmentStatus, DomainError, Error, ProjectId};
use cloudlift_interfaces::{ColumnDef, RelationalDb, Row};

use super::{opt_text_column, sql_params, text_column, timestamp_column};

const TABLE: &str = "assessments";

const SELECT_COLUMNS: &str = "SELECT id, project_id, status, document_keys, summary, \
                              created_at, updated_at FROM assessments";

pub struct AssessmentRepository {
    db: Arc<dyn RelationalDb>,
}

impl AssessmentRepository {
    pub fn new(db: Arc<dyn RelationalDb>) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), Error> {
        self.db
            .create_table(
                TABLE,
                &[
                    ColumnDef::new("id", "TEXT").primary_key(),
                    ColumnDef::new("project_id", "TEXT").not_null(),
                    ColumnDef::new("status", "TEXT").not_null(),
                    ColumnDef::new("document_keys", "TEXT").not_null(),
                    ColumnDef::new("summary", "TEXT"),
                    ColumnDef::new("created_at", "TEXT").not_null(),
                    ColumnDef::new("updated_at", "TEXT").not_null(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert(&self, assessment: &Assessment) -> Result<(), Error> {
        let params = sql_params! {
            "id" => assessment.id.to_string(),
            "project_id" => assessment.project_id.to_string(),
            "status" => assessment.status.as_str(),
            "document_keys" => encode_keys(&assessment.document_keys)?,
            "summary" => assessment.summary.clone(),
            "created_at" => assessment.created_at.to_rfc3339(),
            "updated_at" => assessment.updated_at.to_rfc3339(),
        };
        self.db
            .execute_command(
                "INSERT INTO assessments (id, project_id, status, document_keys, summary, created_at, updated_at) \
                 VALUES (:id, :project_id, :status, :document_keys, :summary, :created_at, :updated_at)",
                &params,
            )
            .await?;
        Ok(())
    }

    pub async fn update(&self, assessment: &Assessment) -> Result<(), Error> {
        let params = sql_params! {
            "id" => assessment.id.to_string(),
            "status" => assessment.status.as_str(),
            "summary" => assessment.summary.clone(),
            "updated_at" => assessment.updated_at.to_rfc3339(),
        };
        self.db
            .execute_command(
                "UPDATE assessments SET status = :status, summary = :summary, \
                 updated_at = :updated_at WHERE id = :id",
                &params,
            )
            .await?;
        Ok(())
    }

    pub async fn fetch(&self, id: AssessmentId) -> Result<Option<Assessment>, Error> {
        let params = sql_params! { "id" => id.to_string() };
        let rows = self
            .db
            .execute_query(&format!("{SELECT_COLUMNS} WHERE id = :id"), &params)
            .await?;
        rows.first().map(assessment_from_row).transpose()
    }

    pub async fn list_for_project(&self, project_id: ProjectId) -> Result<Vec<Assessment>, Error> {
        let params = sql_params! { "project_id" => project_id.to_string() };
        let rows = self
            .db
            .execute_query(
                &format!("{SELECT_COLUMNS} WHERE project_id = :project_id ORDER BY created_at"),
                &params,
            )
            .await?;
        rows.iter().map(assessment_from_row).collect()
    }
}

fn encode_keys(keys: &[String]) -> Result<String, Error> {
    serde_json::to_string(keys).map_err(|e| {
        DomainError::validation_field("document_keys", format!("not serializable: {e}")).into()
    })
}

fn decode_keys(raw: &str) -> Result<Vec<String>, Error> {
    serde_json::from_str(raw).map_err(|e| {
        DomainError::validation_field("document_keys", format!("malformed stored list: {e}")).into()
    })
}

fn assessment_from_row(row: &Row) -> Result<Assessment, Error> {
    Ok(Assessment {
        id: text_column(row, "id")?.parse::<AssessmentId>()?,
        project_id: text_column(row, "project_id")?.parse::<ProjectId>()?,
        status: AssessmentStatus::parse(text_column(row, "status")?)?,
        document_keys: decode_keys(text_column(row, "document_keys")?)?,
        summary: opt_text_column(row, "summary"),
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRelationalDb;

    fn repo() -> AssessmentRepository {
        AssessmentRepository::new(Arc::new(FakeRelationalDb::new()))
    }

    fn assessment(project_id: ProjectId) -> Assessment {
        Assessment::new(
            AssessmentId::new(),
            project_id,
            vec!["uploads/estate.xlsx".into(), "uploads/net.json".into()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_document_keys_and_summary() {
        let repo = repo();
        let mut a = assessment(ProjectId::new());
        repo.insert(&a).await.unwrap();

        a.start().unwrap();
        a.complete("34 VMs, 6 databases").unwrap();
        repo.update(&a).await.unwrap();

        let found = repo.fetch(a.id).await.unwrap().unwrap();
        assert_eq!(found, a);
        assert_eq!(found.document_keys.len(), 2);
        assert_eq!(found.summary.as_deref(), Some("34 VMs, 6 databases"));
    }

    #[tokio::test]
    async fn lists_only_the_requested_project() {
        let repo = repo();
        let project_id = ProjectId::new();
        let a = assessment(project_id);
        let other = assessment(ProjectId::new());
        repo.insert(&a).await.unwrap();
        repo.insert(&other).await.unwrap();

        let listed = repo.list_for_project(project_id).await.unwrap();
        assert_eq!(listed, vec![a]);
    }
}
