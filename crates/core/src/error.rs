//! Error model for the whole platform.
//!
//! Four families, one per architectural layer:
//!
//! - [`ConfigurationError`] — config files and `${VAR}` resolution.
//! - [`InfrastructureError`] — adapter failures. Adapters catch every
//!   backend-native error and re-raise one of these variants; a backend
//!   client's own error type never crosses an interface boundary.
//! - [`DomainError`] — deterministic business failures (validation,
//!   invariants, conflicts). Raised by entities and handlers, never adapters.
//! - [`ApplicationError`] — use-case dispatch failures (mediator, auth).
//!
//! Every error serializes to the same [`ErrorBody`] shape so a presentation
//! layer can map `error_code` to a status code uniformly, and can show
//! `user_message` without leaking query text or backend context.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Boxed error used to retain causes across layer boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Serializable error payload exposed at API boundaries.
///
/// `message` is technical (for logs/debugging); `user_message` is safe to
/// show to an end user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error_type: &'static str,
    pub error_code: &'static str,
    pub message: String,
    pub user_message: String,
    pub context: BTreeMap<String, String>,
}

/// Malformed/missing configuration, or an unresolvable `${VAR}` token.
#[derive(Debug, Error)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error_type: "ConfigurationError",
            error_code: "configuration_error",
            message: self.message.clone(),
            user_message: "The service is misconfigured.".to_string(),
            context: self.context.clone(),
        }
    }
}

/// Adapter-layer failure wrapping a backend-native error.
///
/// Each variant carries enough context (`service`, `operation`, the key or
/// query involved) to debug without backend-specific knowledge. The original
/// backend error, when available, is retained as `source`.
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error ({database_type}, {operation}): {message}")]
    Database {
        database_type: String,
        operation: String,
        message: String,
        query: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("object storage error ({service}, {operation}): {message}")]
    ObjectStorage {
        service: String,
        operation: String,
        message: String,
        bucket: Option<String>,
        key: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// The requested object does not exist.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("message bus error ({service}, {operation}): {message}")]
    MessageBus {
        service: String,
        operation: String,
        message: String,
        target: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("secrets manager error ({service}, {operation}): {message}")]
    Secrets {
        service: String,
        operation: String,
        message: String,
        name: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// The requested secret does not exist.
    #[error("secret not found: {name}")]
    SecretNotFound { name: String },
}

impl InfrastructureError {
    /// Database error without a retained source (message-only backends).
    pub fn database(
        database_type: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Database {
            database_type: database_type.into(),
            operation: operation.into(),
            message: message.into(),
            query: None,
            source: None,
        }
    }

    pub fn object_storage(
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ObjectStorage {
            service: service.into(),
            operation: operation.into(),
            message: message.into(),
            bucket: None,
            key: None,
            source: None,
        }
    }

    pub fn message_bus(
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MessageBus {
            service: service.into(),
            operation: operation.into(),
            message: message.into(),
            target: None,
            source: None,
        }
    }

    pub fn secrets(
        service: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Secrets {
            service: service.into(),
            operation: operation.into(),
            message: message.into(),
            name: None,
            source: None,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Database { .. } => "database_error",
            Self::ObjectStorage { .. } => "object_storage_error",
            Self::ObjectNotFound { .. } => "object_not_found",
            Self::MessageBus { .. } => "message_bus_error",
            Self::Secrets { .. } => "secrets_manager_error",
            Self::SecretNotFound { .. } => "secret_not_found",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let mut context = BTreeMap::new();
        let user_message = match self {
            Self::Database {
                database_type,
                operation,
                query,
                ..
            } => {
                context.insert("database_type".into(), database_type.clone());
                context.insert("operation".into(), operation.clone());
                if let Some(q) = query {
                    context.insert("query".into(), q.clone());
                }
                "A storage operation failed. Please try again.".to_string()
            }
            Self::ObjectStorage {
                service,
                operation,
                bucket,
                key,
                ..
            } => {
                context.insert("service".into(), service.clone());
                context.insert("operation".into(), operation.clone());
                if let Some(b) = bucket {
                    context.insert("bucket".into(), b.clone());
                }
                if let Some(k) = key {
                    context.insert("key".into(), k.clone());
                }
                "A file operation failed. Please try again.".to_string()
            }
            Self::ObjectNotFound { bucket, key } => {
                context.insert("bucket".into(), bucket.clone());
                context.insert("key".into(), key.clone());
                "The requested file was not found.".to_string()
            }
            Self::MessageBus {
                service,
                operation,
                target,
                ..
            } => {
                context.insert("service".into(), service.clone());
                context.insert("operation".into(), operation.clone());
                if let Some(t) = target {
                    context.insert("target".into(), t.clone());
                }
                "A messaging operation failed. Please try again.".to_string()
            }
            Self::Secrets {
                service,
                operation,
                name,
                ..
            } => {
                context.insert("service".into(), service.clone());
                context.insert("operation".into(), operation.clone());
                if let Some(n) = name {
                    context.insert("secret_name".into(), n.clone());
                }
                "A credentials operation failed.".to_string()
            }
            Self::SecretNotFound { name } => {
                context.insert("secret_name".into(), name.clone());
                "The requested credential was not found.".to_string()
            }
        };
        ErrorBody {
            error_type: "InfrastructureError",
            error_code: self.error_code(),
            message: self.to_string(),
            user_message,
            context,
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic business failures. Infrastructure
/// concerns belong in [`InfrastructureError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// A business rule was violated.
    #[error("business rule violated ({rule}): {message}")]
    BusinessRuleViolation { rule: String, message: String },

    /// A requested entity was not found.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: String },

    /// An entity with the same identity already exists.
    #[error("{entity} already exists: {id}")]
    DuplicateEntity { entity: &'static str, id: String },

    /// A state transition is not allowed from the current state.
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn duplicate(entity: &'static str, id: impl Into<String>) -> Self {
        Self::DuplicateEntity {
            entity,
            id: id.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::BusinessRuleViolation { .. } => "business_rule_violation",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::DuplicateEntity { .. } => "duplicate_entity",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let mut context = BTreeMap::new();
        match self {
            Self::Validation { field, .. } => {
                if let Some(f) = field {
                    context.insert("field".into(), f.clone());
                }
            }
            Self::BusinessRuleViolation { rule, .. } => {
                context.insert("rule".into(), rule.clone());
            }
            Self::EntityNotFound { entity, id } | Self::DuplicateEntity { entity, id } => {
                context.insert("entity".into(), (*entity).to_string());
                context.insert("id".into(), id.clone());
            }
            Self::InvalidStateTransition { entity, from, to } => {
                context.insert("entity".into(), (*entity).to_string());
                context.insert("from".into(), from.clone());
                context.insert("to".into(), to.clone());
            }
        }
        // Domain errors are expected outcomes; the technical message is
        // already safe to show.
        ErrorBody {
            error_type: "DomainError",
            error_code: self.error_code(),
            message: self.to_string(),
            user_message: self.to_string(),
            context,
        }
    }
}

/// Application-layer (use-case dispatch) error.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Command dispatch failed: no handler registered, or the handler failed
    /// with a non-domain error (retained as `source`).
    #[error("command handler error for {command_type}: {message}")]
    CommandHandler {
        command_type: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Query dispatch failed. Same discipline as `CommandHandler`.
    #[error("query handler error for {query_type}: {message}")]
    QueryHandler {
        query_type: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("authorization failed: {message}")]
    Authorization { message: String },

    #[error("invalid command {command_type}: {message}")]
    InvalidCommand {
        command_type: String,
        message: String,
    },

    #[error("invalid query {query_type}: {message}")]
    InvalidQuery { query_type: String, message: String },

    #[error("concurrency conflict: {message}")]
    Concurrency { message: String },
}

impl ApplicationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CommandHandler { .. } => "command_handler_error",
            Self::QueryHandler { .. } => "query_handler_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::InvalidCommand { .. } => "invalid_command",
            Self::InvalidQuery { .. } => "invalid_query",
            Self::Concurrency { .. } => "concurrency_error",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let mut context = BTreeMap::new();
        match self {
            Self::CommandHandler { command_type, .. } | Self::InvalidCommand { command_type, .. } => {
                context.insert("command_type".into(), command_type.clone());
            }
            Self::QueryHandler { query_type, .. } | Self::InvalidQuery { query_type, .. } => {
                context.insert("query_type".into(), query_type.clone());
            }
            _ => {}
        }
        ErrorBody {
            error_type: "ApplicationError",
            error_code: self.error_code(),
            message: self.to_string(),
            user_message: "The request could not be processed.".to_string(),
            context,
        }
    }
}

/// Top-level error: the union of all families.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl Error {
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Self::Configuration(e) => e.to_body(),
            Self::Infrastructure(e) => e.to_body(),
            Self::Domain(e) => e.to_body(),
            Self::Application(e) => e.to_body(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_error_serializes_with_context() {
        let err = InfrastructureError::Database {
            database_type: "postgresql".into(),
            operation: "execute_query".into(),
            message: "connection refused".into(),
            query: Some("SELECT 1".into()),
            source: None,
        };
        let body = err.to_body();
        assert_eq!(body.error_code, "database_error");
        assert_eq!(body.context.get("query").map(String::as_str), Some("SELECT 1"));
        assert_ne!(body.user_message, body.message);
    }

    #[test]
    fn command_handler_error_retains_source() {
        let cause = std::io::Error::other("boom");
        let err = ApplicationError::CommandHandler {
            command_type: "CreateProjectCommand".into(),
            message: "handler failed".into(),
            source: Some(Box::new(cause)),
        };
        let source = std::error::Error::source(&err).expect("source retained");
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn object_not_found_has_distinct_code() {
        let err = InfrastructureError::ObjectNotFound {
            bucket: "docs".into(),
            key: "missing".into(),
        };
        assert_eq!(err.to_body().error_code, "object_not_found");
    }
}
