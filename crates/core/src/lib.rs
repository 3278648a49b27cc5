//! `cloudlift-core` — error taxonomy, typed identifiers and domain entities.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod assessment;
pub mod client;
pub mod error;
pub mod id;
pub mod project;

pub use assessment::{Assessment, AssessmentStatus};
pub use client::Client;
pub use error::{
    ApplicationError, BoxError, ConfigurationError, DomainError, DomainResult, Error, ErrorBody,
    InfrastructureError,
};
pub use id::{AssessmentId, ClientId, ProjectId, UserId};
pub use project::{Project, ProjectStatus};
