//! Dependency container: lazy, memoizing composition root.
//!
//! One instance per capability per container. Nothing here is global;
//! several containers (with different configs) can coexist in one process,
//! which is how tests isolate themselves.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use tracing::{info, warn};

use cloudlift_adapters::{
    AdapterConfig, build_graph_db, build_message_bus, build_object_storage, build_relational_db,
    build_secrets_manager, build_vector_db,
};
use cloudlift_config::AppConfig;
use cloudlift_core::{ConfigurationError, Error};
use cloudlift_interfaces::{
    GraphDb, MessageBus, ObjectStorage, RelationalDb, SecretsManager, VectorDb,
};

use crate::handlers::{AssessmentHandlers, ClientHandlers, ProjectHandlers};
use crate::mediator::Mediator;
use crate::repository::{AssessmentRepository, ClientRepository, ProjectRepository};
use crate::{commands, queries};

pub struct DependencyContainer {
    config: AppConfig,
    relational_db: OnceCell<Arc<dyn RelationalDb>>,
    graph_db: OnceCell<Arc<dyn GraphDb>>,
    vector_db: OnceCell<Arc<dyn VectorDb>>,
    object_storage: OnceCell<Arc<dyn ObjectStorage>>,
    message_bus: OnceCell<Arc<dyn MessageBus>>,
    secrets_manager: OnceCell<Arc<dyn SecretsManager>>,
    mediator: OnceCell<Arc<Mediator>>,
}

impl DependencyContainer {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            relational_db: OnceCell::new(),
            graph_db: OnceCell::new(),
            vector_db: OnceCell::new(),
            object_storage: OnceCell::new(),
            message_bus: OnceCell::new(),
            secrets_manager: OnceCell::new(),
            mediator: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn adapter_section(&self, name: &str) -> Result<AdapterConfig, Error> {
        let path = format!("adapters.{name}");
        let section = self.config.section(&path).ok_or_else(|| {
            ConfigurationError::new(format!("missing config section '{path}'"))
                .with("section", path.clone())
        })?;
        Ok(AdapterConfig::new(section.clone()))
    }

    pub fn get_relational_db(&self) -> Result<Arc<dyn RelationalDb>, Error> {
        self.relational_db
            .get_or_try_init(|| build_relational_db(&self.adapter_section("relational_db")?))
            .cloned()
    }

    pub fn get_graph_db(&self) -> Result<Arc<dyn GraphDb>, Error> {
        self.graph_db
            .get_or_try_init(|| build_graph_db(&self.adapter_section("graph_db")?))
            .cloned()
    }

    pub fn get_vector_db(&self) -> Result<Arc<dyn VectorDb>, Error> {
        self.vector_db
            .get_or_try_init(|| build_vector_db(&self.adapter_section("vector_db")?))
            .cloned()
    }

    pub fn get_object_storage(&self) -> Result<Arc<dyn ObjectStorage>, Error> {
        self.object_storage
            .get_or_try_init(|| build_object_storage(&self.adapter_section("object_storage")?))
            .cloned()
    }

    pub fn get_message_bus(&self) -> Result<Arc<dyn MessageBus>, Error> {
        self.message_bus
            .get_or_try_init(|| build_message_bus(&self.adapter_section("message_bus")?))
            .cloned()
    }

    pub fn get_secrets_manager(&self) -> Result<Arc<dyn SecretsManager>, Error> {
        self.secrets_manager
            .get_or_try_init(|| build_secrets_manager(&self.adapter_section("secrets_manager")?))
            .cloned()
    }

    /// The mediator with every command and query handler registered. Built
    /// once; later calls return the same instance without re-registering.
    pub fn get_mediator(&self) -> Result<Arc<Mediator>, Error> {
        self.mediator
            .get_or_try_init(|| {
                let db = self.get_relational_db()?;
                let projects = Arc::new(ProjectRepository::new(db.clone()));
                let clients = Arc::new(ClientRepository::new(db.clone()));
                let assessments = Arc::new(AssessmentRepository::new(db));

                let project_handlers =
                    Arc::new(ProjectHandlers::new(projects.clone(), clients.clone()));
                let client_handlers = Arc::new(ClientHandlers::new(clients));
                let assessment_handlers =
                    Arc::new(AssessmentHandlers::new(assessments, projects));

                let mut mediator = Mediator::new();
                mediator
                    .register_command_handler::<commands::CreateProject, _>(project_handlers.clone());
                mediator
                    .register_command_handler::<commands::UpdateProject, _>(project_handlers.clone());
                mediator
                    .register_command_handler::<commands::ArchiveProject, _>(project_handlers.clone());
                mediator.register_query_handler::<queries::GetProject, _>(project_handlers.clone());
                mediator.register_query_handler::<queries::ListProjects, _>(project_handlers.clone());
                mediator.register_query_handler::<queries::SearchProjects, _>(project_handlers);

                mediator.register_command_handler::<commands::CreateClient, _>(client_handlers.clone());
                mediator.register_query_handler::<queries::GetClient, _>(client_handlers.clone());
                mediator.register_query_handler::<queries::ListClients, _>(client_handlers);

                mediator.register_command_handler::<commands::CreateAssessment, _>(
                    assessment_handlers.clone(),
                );
                mediator.register_command_handler::<commands::StartAssessment, _>(
                    assessment_handlers.clone(),
                );
                mediator.register_command_handler::<commands::CompleteAssessment, _>(
                    assessment_handlers.clone(),
                );
                mediator
                    .register_query_handler::<queries::GetAssessment, _>(assessment_handlers.clone());
                mediator.register_query_handler::<queries::ListAssessmentsForProject, _>(
                    assessment_handlers,
                );

                info!("mediator built, handlers registered");
                Ok(Arc::new(mediator))
            })
            .cloned()
    }

    /// Create the domain tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), Error> {
        let db = self.get_relational_db()?;
        ProjectRepository::new(db.clone()).ensure_schema().await?;
        ClientRepository::new(db.clone()).ensure_schema().await?;
        AssessmentRepository::new(db).ensure_schema().await
    }

    /// Health of every adapter with a config section, as `(interface, ok)`.
    /// Adapters that fail to build report unhealthy instead of erroring.
    pub async fn health_report(&self) -> Vec<(&'static str, bool)> {
        let mut report = Vec::new();
        for name in [
            "relational_db",
            "graph_db",
            "vector_db",
            "object_storage",
            "message_bus",
            "secrets_manager",
        ] {
            if self.config.section(&format!("adapters.{name}")).is_none() {
                continue;
            }
            let healthy = match name {
                "relational_db" => match self.get_relational_db() {
                    Ok(db) => db.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                "graph_db" => match self.get_graph_db() {
                    Ok(db) => db.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                "vector_db" => match self.get_vector_db() {
                    Ok(db) => db.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                "object_storage" => match self.get_object_storage() {
                    Ok(storage) => storage.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                "message_bus" => match self.get_message_bus() {
                    Ok(bus) => bus.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                "secrets_manager" => match self.get_secrets_manager() {
                    Ok(secrets) => secrets.health_check().await,
                    Err(e) => report_build_failure(name, &e),
                },
                _ => unreachable!(),
            };
            report.push((name, healthy));
        }
        report
    }

    /// Disconnect every adapter this container actually built. Called once at
    /// process exit; adapters that were never requested are never touched.
    pub async fn shutdown(&self) -> Result<(), Error> {
        if let Some(db) = self.relational_db.get() {
            db.disconnect().await?;
            info!("relational database disconnected");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn seed_relational_db(&self, db: Arc<dyn RelationalDb>) {
        if self.relational_db.set(db).is_err() {
            panic!("relational db already built");
        }
    }
}

fn report_build_failure(name: &str, err: &Error) -> bool {
    warn!(adapter = name, error = %err, "adapter failed to build");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::test_support::FakeRelationalDb;

    fn config() -> AppConfig {
        AppConfig::from_value(
            "test",
            json!({
                "adapters": {
                    "relational_db": {"type": "PostgresAdapter"},
                    "message_bus": {"type": "InMemoryMessageAdapter"},
                    "secrets_manager": {"type": "EnvironmentSecretsAdapter"}
                }
            }),
        )
    }

    #[test]
    fn one_instance_per_interface_per_container() {
        let container = DependencyContainer::new(config());
        let first = container.get_relational_db().unwrap();
        let second = container.get_relational_db().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let bus_a = container.get_message_bus().unwrap();
        let bus_b = container.get_message_bus().unwrap();
        assert!(Arc::ptr_eq(&bus_a, &bus_b));
    }

    #[test]
    fn separate_containers_build_separate_instances() {
        let a = DependencyContainer::new(config());
        let b = DependencyContainer::new(config());
        assert!(!Arc::ptr_eq(
            &a.get_relational_db().unwrap(),
            &b.get_relational_db().unwrap()
        ));
    }

    #[test]
    fn missing_section_is_a_configuration_error() {
        let container = DependencyContainer::new(config());
        let err = container.get_graph_db().map(|_| ()).unwrap_err();
        let body = err.to_body();
        assert_eq!(body.error_code, "configuration_error");
        assert!(body.message.contains("adapters.graph_db"));
    }

    #[test]
    fn mediator_is_built_once() {
        let container = DependencyContainer::new(config());
        container.seed_relational_db(Arc::new(FakeRelationalDb::new()));
        let first = container.get_mediator().unwrap();
        let second = container.get_mediator().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn end_to_end_command_and_query_flow() {
        let container = DependencyContainer::new(config());
        container.seed_relational_db(Arc::new(FakeRelationalDb::new()));
        container.ensure_schema().await.unwrap();
        let mediator = container.get_mediator().unwrap();

        let create_client = commands::CreateClient::new("Acme", "ops@acme.io", None);
        let client_id = create_client.client_id;
        mediator.send_command(create_client).await.unwrap();

        let create_project = commands::CreateProject::new(client_id, "DC exit", "wave 1");
        let project_id = create_project.project_id;
        mediator.send_command(create_project).await.unwrap();

        let create_assessment =
            commands::CreateAssessment::new(project_id, vec!["uploads/estate.xlsx".into()]);
        let assessment_id = create_assessment.assessment_id;
        mediator.send_command(create_assessment).await.unwrap();
        mediator
            .send_command(commands::StartAssessment::new(assessment_id))
            .await
            .unwrap();
        mediator
            .send_command(commands::CompleteAssessment::succeeded(
                assessment_id,
                "12 servers, 3 databases",
            ))
            .await
            .unwrap();

        let project = mediator
            .send_query(queries::GetProject::new(project_id))
            .await
            .unwrap();
        assert_eq!(project.status, cloudlift_core::ProjectStatus::Active);

        let assessments = mediator
            .send_query(queries::ListAssessmentsForProject::new(project_id))
            .await
            .unwrap();
        assert_eq!(assessments.len(), 1);
        assert_eq!(
            assessments[0].summary.as_deref(),
            Some("12 servers, 3 databases")
        );

        container.shutdown().await.unwrap();
    }
}
