//! CQRS mediator: type-keyed command/query dispatch.
//!
//! Registration is keyed by the concrete message type (`TypeId`); last
//! registration wins. Dispatch is an O(1) exact-type lookup, no subtype or
//! fallback resolution. Domain errors from handlers pass through unchanged;
//! any other handler failure is wrapped in a `CommandHandler`/`QueryHandler`
//! application error with the original retained as source.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use cloudlift_core::{ApplicationError, Error};

use crate::messages::{Command, Query};

/// Handles one concrete command type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, command: C) -> Result<(), Error>;
}

/// Handles one concrete query type.
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(&self, query: Q) -> Result<Q::Output, Error>;
}

type ErasedCommandHandler =
    Box<dyn Fn(Box<dyn Any + Send>) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;
type ErasedQueryHandler = Box<
    dyn Fn(Box<dyn Any + Send>) -> BoxFuture<'static, Result<Box<dyn Any + Send>, Error>>
        + Send
        + Sync,
>;

/// Routes commands and queries to their registered handlers.
///
/// Built once by the composition root (registration takes `&mut self`),
/// then shared immutably behind an `Arc`.
#[derive(Default)]
pub struct Mediator {
    commands: HashMap<TypeId, ErasedCommandHandler>,
    queries: HashMap<TypeId, ErasedQueryHandler>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_command_handler<C, H>(&mut self, handler: Arc<H>)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        debug!(command = type_name::<C>(), "command handler registered");
        self.commands.insert(
            TypeId::of::<C>(),
            Box::new(move |boxed| {
                let handler = handler.clone();
                Box::pin(async move {
                    let command = downcast::<C>(boxed)?;
                    handler
                        .handle(*command)
                        .await
                        .map_err(|e| wrap_failure::<C>(e, Kind::Command))
                })
            }),
        );
    }

    pub fn register_query_handler<Q, H>(&mut self, handler: Arc<H>)
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        debug!(query = type_name::<Q>(), "query handler registered");
        self.queries.insert(
            TypeId::of::<Q>(),
            Box::new(move |boxed| {
                let handler = handler.clone();
                Box::pin(async move {
                    let query = downcast::<Q>(boxed)?;
                    let output = handler
                        .handle(*query)
                        .await
                        .map_err(|e| wrap_failure::<Q>(e, Kind::Query))?;
                    Ok(Box::new(output) as Box<dyn Any + Send>)
                })
            }),
        );
    }

    pub async fn send_command<C: Command>(&self, command: C) -> Result<(), Error> {
        let handler = self.commands.get(&TypeId::of::<C>()).ok_or_else(|| {
            Error::from(ApplicationError::CommandHandler {
                command_type: type_name::<C>().to_string(),
                message: "no handler registered".to_string(),
                source: None,
            })
        })?;
        handler(Box::new(command)).await
    }

    pub async fn send_query<Q: Query>(&self, query: Q) -> Result<Q::Output, Error> {
        let handler = self.queries.get(&TypeId::of::<Q>()).ok_or_else(|| {
            Error::from(ApplicationError::QueryHandler {
                query_type: type_name::<Q>().to_string(),
                message: "no handler registered".to_string(),
                source: None,
            })
        })?;
        let output = handler(Box::new(query)).await?;
        output.downcast::<Q::Output>().map(|boxed| *boxed).map_err(|_| {
            ApplicationError::QueryHandler {
                query_type: type_name::<Q>().to_string(),
                message: "handler produced a mismatched output type".to_string(),
                source: None,
            }
            .into()
        })
    }
}

enum Kind {
    Command,
    Query,
}

fn downcast<M: 'static>(boxed: Box<dyn Any + Send>) -> Result<Box<M>, Error> {
    // Unreachable through the public API: the map key guarantees the type.
    boxed.downcast::<M>().map_err(|_| {
        ApplicationError::InvalidCommand {
            command_type: type_name::<M>().to_string(),
            message: "dispatched message does not match its registration".to_string(),
        }
        .into()
    })
}

fn wrap_failure<M>(err: Error, kind: Kind) -> Error {
    match err {
        Error::Domain(domain) => Error::Domain(domain),
        other => {
            let message = other.to_string();
            match kind {
                Kind::Command => ApplicationError::CommandHandler {
                    command_type: type_name::<M>().to_string(),
                    message,
                    source: Some(Box::new(other)),
                },
                Kind::Query => ApplicationError::QueryHandler {
                    query_type: type_name::<M>().to_string(),
                    message,
                    source: Some(Box::new(other)),
                },
            }
            .into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cloudlift_core::{DomainError, InfrastructureError};

    use crate::messages::MessageInfo;

    struct Ping {
        info: MessageInfo,
    }

    impl Ping {
        fn new() -> Self {
            Self {
                info: MessageInfo::new(),
            }
        }
    }

    impl Command for Ping {
        fn info(&self) -> &MessageInfo {
            &self.info
        }
    }

    struct OtherPing {
        info: MessageInfo,
    }

    impl Command for OtherPing {
        fn info(&self) -> &MessageInfo {
            &self.info
        }
    }

    struct CountPings {
        info: MessageInfo,
    }

    impl Query for CountPings {
        type Output = usize;

        fn info(&self) -> &MessageInfo {
            &self.info
        }
    }

    #[derive(Default)]
    struct PingHandler {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler<Ping> for PingHandler {
        async fn handle(&self, _command: Ping) -> Result<(), Error> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl QueryHandler<CountPings> for PingHandler {
        async fn handle(&self, _query: CountPings) -> Result<usize, Error> {
            Ok(self.hits.load(Ordering::SeqCst))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl CommandHandler<Ping> for FailingHandler {
        async fn handle(&self, _command: Ping) -> Result<(), Error> {
            Err(InfrastructureError::database(
                "postgresql",
                "execute_command",
                "connection refused",
            )
            .into())
        }
    }

    struct DomainFailingHandler;

    #[async_trait]
    impl CommandHandler<Ping> for DomainFailingHandler {
        async fn handle(&self, _command: Ping) -> Result<(), Error> {
            Err(DomainError::not_found("project", "p-1").into())
        }
    }

    #[tokio::test]
    async fn dispatches_by_exact_type() {
        let handler = Arc::new(PingHandler::default());
        let mut mediator = Mediator::new();
        mediator.register_command_handler::<Ping, _>(handler.clone());
        mediator.register_query_handler::<CountPings, _>(handler.clone());

        mediator.send_command(Ping::new()).await.unwrap();
        mediator.send_command(Ping::new()).await.unwrap();
        let count = mediator
            .send_query(CountPings {
                info: MessageInfo::new(),
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn missing_handler_names_the_type() {
        let mediator = Mediator::new();
        let err = mediator
            .send_command(OtherPing {
                info: MessageInfo::new(),
            })
            .await
            .unwrap_err();
        let body = err.to_body();
        assert_eq!(body.error_code, "command_handler_error");
        assert!(body.message.contains("OtherPing"), "got: {}", body.message);
    }

    #[tokio::test]
    async fn registering_ping_does_not_handle_other_ping() {
        let mut mediator = Mediator::new();
        mediator.register_command_handler::<Ping, _>(Arc::new(PingHandler::default()));
        assert!(
            mediator
                .send_command(OtherPing {
                    info: MessageInfo::new(),
                })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let first = Arc::new(PingHandler::default());
        let second = Arc::new(PingHandler::default());
        let mut mediator = Mediator::new();
        mediator.register_command_handler::<Ping, _>(first.clone());
        mediator.register_command_handler::<Ping, _>(second.clone());

        mediator.send_command(Ping::new()).await.unwrap();
        assert_eq!(first.hits.load(Ordering::SeqCst), 0);
        assert_eq!(second.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn infrastructure_failure_is_wrapped_with_source() {
        let mut mediator = Mediator::new();
        mediator.register_command_handler::<Ping, _>(Arc::new(FailingHandler));

        let err = mediator.send_command(Ping::new()).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "command_handler_error");
        let source = std::error::Error::source(&err).expect("cause retained");
        assert!(source.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn domain_failure_passes_through_unwrapped() {
        let mut mediator = Mediator::new();
        mediator.register_command_handler::<Ping, _>(Arc::new(DomainFailingHandler));

        let err = mediator.send_command(Ping::new()).await.unwrap_err();
        assert_eq!(err.to_body().error_code, "entity_not_found");
    }
}
