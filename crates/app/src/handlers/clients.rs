//! Client use cases.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cloudlift_core::{Client, DomainError, Error};

use crate::commands::CreateClient;
use crate::mediator::{CommandHandler, QueryHandler};
use crate::queries::{GetClient, ListClients};
use crate::repository::ClientRepository;

pub struct ClientHandlers {
    clients: Arc<ClientRepository>,
}

impl ClientHandlers {
    pub fn new(clients: Arc<ClientRepository>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl CommandHandler<CreateClient> for ClientHandlers {
    async fn handle(&self, command: CreateClient) -> Result<(), Error> {
        if self.clients.fetch(command.client_id).await?.is_some() {
            return Err(DomainError::duplicate("client", command.client_id.to_string()).into());
        }
        let client = Client::new(
            command.client_id,
            command.name,
            command.contact_email,
            command.industry,
        )?;
        self.clients.insert(&client).await?;
        info!(client_id = %client.id, "client created");
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<GetClient> for ClientHandlers {
    async fn handle(&self, query: GetClient) -> Result<Client, Error> {
        self.clients
            .fetch(query.client_id)
            .await?
            .ok_or_else(|| DomainError::not_found("client", query.client_id.to_string()).into())
    }
}

#[async_trait]
impl QueryHandler<ListClients> for ClientHandlers {
    async fn handle(&self, _query: ListClients) -> Result<Vec<Client>, Error> {
        self.clients.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudlift_core::ClientId;

    use crate::test_support::FakeRelationalDb;

    fn handlers() -> ClientHandlers {
        let db: Arc<dyn cloudlift_interfaces::RelationalDb> = Arc::new(FakeRelationalDb::new());
        ClientHandlers::new(Arc::new(ClientRepository::new(db)))
    }

    #[tokio::test]
    async fn create_then_get() {
        let handlers = handlers();
        let command = CreateClient::new("Acme", "ops@acme.io", Some("retail".into()));
        let id = command.client_id;
        CommandHandler::handle(&handlers, command).await.unwrap();

        let client = QueryHandler::handle(&handlers, GetClient::new(id)).await.unwrap();
        assert_eq!(client.name, "Acme");
        assert_eq!(client.industry.as_deref(), Some("retail"));
    }

    #[tokio::test]
    async fn invalid_email_is_a_validation_error() {
        let handlers = handlers();
        let err = CommandHandler::handle(&handlers, CreateClient::new("Acme", "nope", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_body().error_code, "validation_error");
    }

    #[tokio::test]
    async fn get_missing_client_is_not_found() {
        let handlers = handlers();
        let err = QueryHandler::handle(&handlers, GetClient::new(ClientId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_body().error_code, "entity_not_found");
    }

    #[tokio::test]
    async fn list_returns_every_client() {
        let handlers = handlers();
        for name in ["Acme", "Globex"] {
            CommandHandler::handle(&handlers, CreateClient::new(name, "it@corp.io", None))
                .await
                .unwrap();
        }
        let all = QueryHandler::handle(&handlers, ListClients::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
