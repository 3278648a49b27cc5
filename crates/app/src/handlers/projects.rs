//! Project use cases.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cloudlift_core::{DomainError, Error, Project};

use crate::commands::{ArchiveProject, CreateProject, UpdateProject};
use crate::mediator::{CommandHandler, QueryHandler};
use crate::queries::{GetProject, ListProjects, SearchProjects};
use crate::repository::{ClientRepository, ProjectRepository};

pub struct ProjectHandlers {
    projects: Arc<ProjectRepository>,
    clients: Arc<ClientRepository>,
}

impl ProjectHandlers {
    pub fn new(projects: Arc<ProjectRepository>, clients: Arc<ClientRepository>) -> Self {
        Self { projects, clients }
    }

    async fn require_project(
        &self,
        id: cloudlift_core::ProjectId,
    ) -> Result<Project, Error> {
        self.projects
            .fetch(id)
            .await?
            .ok_or_else(|| DomainError::not_found("project", id.to_string()).into())
    }
}

#[async_trait]
impl CommandHandler<CreateProject> for ProjectHandlers {
    async fn handle(&self, command: CreateProject) -> Result<(), Error> {
        if self.clients.fetch(command.client_id).await?.is_none() {
            return Err(DomainError::not_found("client", command.client_id.to_string()).into());
        }
        if self.projects.fetch(command.project_id).await?.is_some() {
            return Err(DomainError::duplicate("project", command.project_id.to_string()).into());
        }
        let project = Project::new(
            command.project_id,
            command.client_id,
            command.name,
            command.description,
        )?;
        self.projects.insert(&project).await?;
        info!(project_id = %project.id, client_id = %project.client_id, "project created");
        Ok(())
    }
}

#[async_trait]
impl CommandHandler<UpdateProject> for ProjectHandlers {
    async fn handle(&self, command: UpdateProject) -> Result<(), Error> {
        let mut project = self.require_project(command.project_id).await?;
        project.update(command.name, command.description)?;
        self.projects.update(&project).await
    }
}

#[async_trait]
impl CommandHandler<ArchiveProject> for ProjectHandlers {
    async fn handle(&self, command: ArchiveProject) -> Result<(), Error> {
        let mut project = self.require_project(command.project_id).await?;
        project.archive()?;
        self.projects.update(&project).await?;
        info!(project_id = %project.id, "project archived");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<GetProject> for ProjectHandlers {
    async fn handle(&self, query: GetProject) -> Result<Project, Error> {
        self.require_project(query.project_id).await
    }
}

#[async_trait]
impl QueryHandler<ListProjects> for ProjectHandlers {
    async fn handle(&self, query: ListProjects) -> Result<Vec<Project>, Error> {
        self.projects.list(query.client_id).await
    }
}

#[async_trait]
impl QueryHandler<SearchProjects> for ProjectHandlers {
    async fn handle(&self, query: SearchProjects) -> Result<Vec<Project>, Error> {
        let term = query.term.trim();
        if term.is_empty() {
            return Err(DomainError::validation_field("term", "must not be empty").into());
        }
        self.projects.search(term).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudlift_core::{Client, ClientId, ProjectId, ProjectStatus};

    use crate::messages::{Command, Query};
    use crate::test_support::FakeRelationalDb;

    struct Fixture {
        handlers: ProjectHandlers,
        projects: Arc<ProjectRepository>,
        client_id: ClientId,
    }

    impl Fixture {
        async fn send<C>(&self, command: C) -> Result<(), Error>
        where
            C: Command,
            ProjectHandlers: CommandHandler<C>,
        {
            CommandHandler::handle(&self.handlers, command).await
        }

        async fn ask<Q>(&self, query: Q) -> Result<Q::Output, Error>
        where
            Q: Query,
            ProjectHandlers: QueryHandler<Q>,
        {
            QueryHandler::handle(&self.handlers, query).await
        }
    }

    async fn fixture() -> Fixture {
        let db: Arc<dyn cloudlift_interfaces::RelationalDb> = Arc::new(FakeRelationalDb::new());
        let projects = Arc::new(ProjectRepository::new(db.clone()));
        let clients = Arc::new(ClientRepository::new(db));
        let client = Client::new(ClientId::new(), "Acme", "ops@acme.io", None).unwrap();
        clients.insert(&client).await.unwrap();
        Fixture {
            handlers: ProjectHandlers::new(projects.clone(), clients),
            projects,
            client_id: client.id,
        }
    }

    #[tokio::test]
    async fn create_persists_a_draft_project() {
        let fx = fixture().await;
        let command = CreateProject::new(fx.client_id, "DC exit", "wave 1");
        let id = command.project_id;
        fx.send(command).await.unwrap();

        let stored = fx.projects.fetch(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProjectStatus::Draft);
        assert_eq!(stored.name, "DC exit");
    }

    #[tokio::test]
    async fn create_rejects_unknown_client() {
        let fx = fixture().await;
        let err = fx
            .send(CreateProject::new(ClientId::new(), "orphan", ""))
            .await
            .unwrap_err();
        assert_eq!(err.to_body().error_code, "entity_not_found");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let fx = fixture().await;
        let first = CreateProject::new(fx.client_id, "one", "");
        let mut second = CreateProject::new(fx.client_id, "two", "");
        second.project_id = first.project_id;
        fx.send(first).await.unwrap();
        let err = fx.send(second).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "duplicate_entity");
    }

    #[tokio::test]
    async fn archive_then_update_is_rejected() {
        let fx = fixture().await;
        let command = CreateProject::new(fx.client_id, "short lived", "");
        let id = command.project_id;
        fx.send(command).await.unwrap();
        fx.send(ArchiveProject::new(id)).await.unwrap();

        let err = fx.send(UpdateProject::new(id, "rename", "")).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "business_rule_violation");
    }

    #[tokio::test]
    async fn get_missing_project_is_not_found() {
        let fx = fixture().await;
        let err = fx.ask(GetProject::new(ProjectId::new())).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "entity_not_found");
    }

    #[tokio::test]
    async fn list_and_search_reflect_inserts() {
        let fx = fixture().await;
        fx.send(CreateProject::new(fx.client_id, "Mainframe Rehost", ""))
            .await
            .unwrap();
        fx.send(CreateProject::new(fx.client_id, "CRM replatform", ""))
            .await
            .unwrap();

        let all = fx.ask(ListProjects::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        let hits = fx.ask(SearchProjects::new("MAINFRAME")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Mainframe Rehost");
    }

    #[tokio::test]
    async fn search_rejects_blank_terms() {
        let fx = fixture().await;
        let err = fx.ask(SearchProjects::new("   ")).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "validation_error");
    }
}
