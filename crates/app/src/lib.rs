//! `cloudlift-app` — application layer: the dependency container, the CQRS
//! mediator, and the command/query handlers for projects, clients and
//! assessments.
//!
//! The composition flow is `AppConfig` -> [`DependencyContainer`] ->
//! [`Mediator`]: the container memoizes one adapter per capability interface
//! and wires every handler exactly once; callers then talk to the mediator
//! only.

pub mod commands;
pub mod container;
pub mod handlers;
pub mod mediator;
pub mod messages;
pub mod queries;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use container::DependencyContainer;
pub use mediator::{CommandHandler, Mediator, QueryHandler};
pub use messages::{Command, MessageInfo, Query};
