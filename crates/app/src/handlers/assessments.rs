//! Assessment use cases.
//!
//! Creating the first assessment of a `Draft` project activates the project;
//! archived projects do not accept new assessments.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cloudlift_core::{Assessment, DomainError, Error, ProjectStatus};

use crate::commands::{AssessmentOutcome, CompleteAssessment, CreateAssessment, StartAssessment};
use crate::mediator::{CommandHandler, QueryHandler};
use crate::queries::{GetAssessment, ListAssessmentsForProject};
use crate::repository::{AssessmentRepository, ProjectRepository};

pub struct AssessmentHandlers {
    assessments: Arc<AssessmentRepository>,
    projects: Arc<ProjectRepository>,
}

impl AssessmentHandlers {
    pub fn new(assessments: Arc<AssessmentRepository>, projects: Arc<ProjectRepository>) -> Self {
        Self {
            assessments,
            projects,
        }
    }

    async fn require_assessment(
        &self,
        id: cloudlift_core::AssessmentId,
    ) -> Result<Assessment, Error> {
        self.assessments
            .fetch(id)
            .await?
            .ok_or_else(|| DomainError::not_found("assessment", id.to_string()).into())
    }
}

#[async_trait]
impl CommandHandler<CreateAssessment> for AssessmentHandlers {
    async fn handle(&self, command: CreateAssessment) -> Result<(), Error> {
        let mut project = self
            .projects
            .fetch(command.project_id)
            .await?
            .ok_or_else(|| {
                Error::from(DomainError::not_found("project", command.project_id.to_string()))
            })?;
        if project.status == ProjectStatus::Archived {
            return Err(DomainError::BusinessRuleViolation {
                rule: "no_assessments_on_archived_projects".into(),
                message: "an archived project cannot be assessed".into(),
            }
            .into());
        }
        let assessment = Assessment::new(
            command.assessment_id,
            command.project_id,
            command.document_keys,
        )?;
        self.assessments.insert(&assessment).await?;
        if project.status == ProjectStatus::Draft {
            project.activate()?;
            self.projects.update(&project).await?;
        }
        info!(
            assessment_id = %assessment.id,
            project_id = %assessment.project_id,
            documents = assessment.document_keys.len(),
            "assessment created"
        );
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<StartAssessment> for AssessmentHandlers {
    async fn handle(&self, command: StartAssessment) -> Result<(), Error> {
        let mut assessment = self.require_assessment(command.assessment_id).await?;
        assessment.start()?;
        self.assessments.update(&assessment).await?;
        info!(assessment_id = %assessment.id, "assessment started");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<CompleteAssessment> for AssessmentHandlers {
    async fn handle(&self, command: CompleteAssessment) -> Result<(), Error> {
        let mut assessment = self.require_assessment(command.assessment_id).await?;
        match command.outcome {
            AssessmentOutcome::Succeeded { summary } => assessment.complete(summary)?,
            AssessmentOutcome::Failed { reason } => assessment.fail(reason)?,
        }
        self.assessments.update(&assessment).await?;
        info!(
            assessment_id = %assessment.id,
            status = assessment.status.as_str(),
            "assessment finished"
        );
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<GetAssessment> for AssessmentHandlers {
    async fn handle(&self, query: GetAssessment) -> Result<Assessment, Error> {
        self.require_assessment(query.assessment_id).await
    }
}

#[async_trait]
impl QueryHandler<ListAssessmentsForProject> for AssessmentHandlers {
    async fn handle(&self, query: ListAssessmentsForProject) -> Result<Vec<Assessment>, Error> {
        self.assessments.list_for_project(query.project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudlift_core::{AssessmentStatus, Client, ClientId, Project, ProjectId};

    use crate::repository::ClientRepository;
    use crate::test_support::FakeRelationalDb;

    struct Fixture {
        handlers: AssessmentHandlers,
        projects: Arc<ProjectRepository>,
        project_id: ProjectId,
    }

    async fn fixture() -> Fixture {
        let db: Arc<dyn cloudlift_interfaces::RelationalDb> = Arc::new(FakeRelationalDb::new());
        let projects = Arc::new(ProjectRepository::new(db.clone()));
        let clients = ClientRepository::new(db.clone());
        let assessments = Arc::new(AssessmentRepository::new(db));

        let client = Client::new(ClientId::new(), "Acme", "ops@acme.io", None).unwrap();
        clients.insert(&client).await.unwrap();
        let project = Project::new(ProjectId::new(), client.id, "DC exit", "").unwrap();
        projects.insert(&project).await.unwrap();

        Fixture {
            handlers: AssessmentHandlers::new(assessments, projects.clone()),
            projects,
            project_id: project.id,
        }
    }

    #[tokio::test]
    async fn creating_an_assessment_activates_a_draft_project() {
        let fx = fixture().await;
        let command = CreateAssessment::new(fx.project_id, vec!["uploads/estate.xlsx".into()]);
        let id = command.assessment_id;
        CommandHandler::handle(&fx.handlers, command).await.unwrap();

        let project = fx.projects.fetch(fx.project_id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Active);
        let assessment = QueryHandler::handle(&fx.handlers, GetAssessment::new(id))
            .await
            .unwrap();
        assert_eq!(assessment.status, AssessmentStatus::Pending);
    }

    #[tokio::test]
    async fn archived_projects_reject_new_assessments() {
        let fx = fixture().await;
        let mut project = fx.projects.fetch(fx.project_id).await.unwrap().unwrap();
        project.archive().unwrap();
        fx.projects.update(&project).await.unwrap();

        let err = CommandHandler::handle(
            &fx.handlers,
            CreateAssessment::new(fx.project_id, vec!["uploads/x".into()]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_body().error_code, "business_rule_violation");
    }

    #[tokio::test]
    async fn full_lifecycle_to_completed() {
        let fx = fixture().await;
        let command = CreateAssessment::new(fx.project_id, vec!["uploads/estate.xlsx".into()]);
        let id = command.assessment_id;
        CommandHandler::handle(&fx.handlers, command).await.unwrap();
        CommandHandler::handle(&fx.handlers, StartAssessment::new(id))
            .await
            .unwrap();
        CommandHandler::handle(&fx.handlers, CompleteAssessment::succeeded(id, "12 servers"))
            .await
            .unwrap();

        let assessment = QueryHandler::handle(&fx.handlers, GetAssessment::new(id))
            .await
            .unwrap();
        assert_eq!(assessment.status, AssessmentStatus::Completed);
        assert_eq!(assessment.summary.as_deref(), Some("12 servers"));
    }

    #[tokio::test]
    async fn completing_before_start_is_an_invalid_transition() {
        let fx = fixture().await;
        let command = CreateAssessment::new(fx.project_id, vec!["uploads/estate.xlsx".into()]);
        let id = command.assessment_id;
        CommandHandler::handle(&fx.handlers, command).await.unwrap();

        let err = CommandHandler::handle(&fx.handlers, CompleteAssessment::succeeded(id, "early"))
            .await
            .unwrap_err();
        assert_eq!(err.to_body().error_code, "invalid_state_transition");
    }

    #[tokio::test]
    async fn failed_runs_record_the_reason() {
        let fx = fixture().await;
        let command = CreateAssessment::new(fx.project_id, vec!["uploads/estate.xlsx".into()]);
        let id = command.assessment_id;
        CommandHandler::handle(&fx.handlers, command).await.unwrap();
        CommandHandler::handle(&fx.handlers, StartAssessment::new(id))
            .await
            .unwrap();
        CommandHandler::handle(&fx.handlers, CompleteAssessment::failed(id, "parser error"))
            .await
            .unwrap();

        let listed = QueryHandler::handle(
            &fx.handlers,
            ListAssessmentsForProject::new(fx.project_id),
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, AssessmentStatus::Failed);
        assert_eq!(listed[0].summary.as_deref(), Some("parser error"));
    }
}
