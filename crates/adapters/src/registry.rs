//! Adapter selection: config `type` string -> concrete adapter.
//!
//! Selection is a static match per interface; an unknown or missing `type`
//! fails fast with a `ConfigurationError` naming the offending value and
//! the interface, never a silent default.

use std::sync::Arc;

use cloudlift_core::{ConfigurationError, Error};
use cloudlift_interfaces::{GraphDb, MessageBus, ObjectStorage, RelationalDb, SecretsManager, VectorDb};

use crate::bus::{InMemoryMessageAdapter, ServiceBusAdapter, SqsSnsAdapter};
use crate::config_map::AdapterConfig;
use crate::graph::{Neo4jAdapter, Neo4jAuraAdapter};
use crate::relational::{PostgresAdapter, RdsAdapter};
use crate::secrets::{AwsSecretsManagerAdapter, AzureKeyVaultAdapter, EnvironmentSecretsAdapter};
use crate::storage::{AzureBlobAdapter, MinioAdapter, S3Adapter};
use crate::vector::{WeaviateAdapter, WeaviateCloudAdapter};

/// Every adapter type string the registry accepts, per interface.
pub fn known_adapter_types() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("relational_db", &["PostgresAdapter", "RdsAdapter"]),
        ("graph_db", &["Neo4jAdapter", "Neo4jAuraAdapter"]),
        ("vector_db", &["WeaviateAdapter", "WeaviateCloudAdapter"]),
        ("object_storage", &["MinioAdapter", "S3Adapter", "AzureBlobAdapter"]),
        (
            "message_bus",
            &["InMemoryMessageAdapter", "SqsSnsAdapter", "ServiceBusAdapter"],
        ),
        (
            "secrets_manager",
            &[
                "EnvironmentSecretsAdapter",
                "AwsSecretsManagerAdapter",
                "AzureKeyVaultAdapter",
            ],
        ),
    ]
}

fn adapter_type<'a>(interface: &str, cfg: &'a AdapterConfig) -> Result<&'a str, Error> {
    cfg.adapter_type().ok_or_else(|| {
        ConfigurationError::new(format!("missing adapter 'type' for interface '{interface}'"))
            .with("interface", interface)
            .into()
    })
}

fn unknown(interface: &str, kind: &str) -> Error {
    ConfigurationError::new(format!(
        "unknown adapter type '{kind}' for interface '{interface}'"
    ))
    .with("interface", interface)
    .with("type", kind)
    .into()
}

pub fn build_relational_db(cfg: &AdapterConfig) -> Result<Arc<dyn RelationalDb>, Error> {
    match adapter_type("relational_db", cfg)? {
        "PostgresAdapter" => Ok(Arc::new(PostgresAdapter::from_config(cfg))),
        "RdsAdapter" => Ok(Arc::new(RdsAdapter::from_config(cfg))),
        other => Err(unknown("relational_db", other)),
    }
}

pub fn build_graph_db(cfg: &AdapterConfig) -> Result<Arc<dyn GraphDb>, Error> {
    match adapter_type("graph_db", cfg)? {
        "Neo4jAdapter" => Ok(Arc::new(Neo4jAdapter::from_config(cfg)?)),
        "Neo4jAuraAdapter" => Ok(Arc::new(Neo4jAuraAdapter::from_config(cfg)?)),
        other => Err(unknown("graph_db", other)),
    }
}

pub fn build_vector_db(cfg: &AdapterConfig) -> Result<Arc<dyn VectorDb>, Error> {
    match adapter_type("vector_db", cfg)? {
        "WeaviateAdapter" => Ok(Arc::new(WeaviateAdapter::from_config(cfg)?)),
        "WeaviateCloudAdapter" => Ok(Arc::new(WeaviateCloudAdapter::from_config(cfg)?)),
        other => Err(unknown("vector_db", other)),
    }
}

pub fn build_object_storage(cfg: &AdapterConfig) -> Result<Arc<dyn ObjectStorage>, Error> {
    match adapter_type("object_storage", cfg)? {
        "MinioAdapter" => Ok(Arc::new(MinioAdapter::from_config(cfg)?)),
        "S3Adapter" => Ok(Arc::new(S3Adapter::from_config(cfg)?)),
        "AzureBlobAdapter" => Ok(Arc::new(AzureBlobAdapter::from_config(cfg)?)),
        other => Err(unknown("object_storage", other)),
    }
}

pub fn build_message_bus(cfg: &AdapterConfig) -> Result<Arc<dyn MessageBus>, Error> {
    match adapter_type("message_bus", cfg)? {
        "InMemoryMessageAdapter" => Ok(Arc::new(InMemoryMessageAdapter::new())),
        "SqsSnsAdapter" => Ok(Arc::new(SqsSnsAdapter::from_config(cfg)?)),
        "ServiceBusAdapter" => Ok(Arc::new(ServiceBusAdapter::from_config(cfg)?)),
        other => Err(unknown("message_bus", other)),
    }
}

pub fn build_secrets_manager(cfg: &AdapterConfig) -> Result<Arc<dyn SecretsManager>, Error> {
    match adapter_type("secrets_manager", cfg)? {
        "EnvironmentSecretsAdapter" => Ok(Arc::new(EnvironmentSecretsAdapter::from_config(cfg))),
        "AwsSecretsManagerAdapter" => Ok(Arc::new(AwsSecretsManagerAdapter::from_config(cfg)?)),
        "AzureKeyVaultAdapter" => Ok(Arc::new(AzureKeyVaultAdapter::from_config(cfg)?)),
        other => Err(unknown("secrets_manager", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(value: serde_json::Value) -> AdapterConfig {
        AdapterConfig::new(value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn every_known_type_builds() {
        for (interface, types) in known_adapter_types() {
            for kind in *types {
                let section = if *kind == "AzureBlobAdapter" {
                    // The Azure builder refuses to build without an account.
                    cfg(json!({
                        "type": kind,
                        "account": "devstoreaccount1",
                        "use_emulator": true,
                    }))
                } else {
                    cfg(json!({"type": kind}))
                };
                let built = match *interface {
                    "relational_db" => build_relational_db(&section).map(|_| ()),
                    "graph_db" => build_graph_db(&section).map(|_| ()),
                    "vector_db" => build_vector_db(&section).map(|_| ()),
                    "object_storage" => build_object_storage(&section).map(|_| ()),
                    "message_bus" => build_message_bus(&section).map(|_| ()),
                    "secrets_manager" => build_secrets_manager(&section).map(|_| ()),
                    other => panic!("unexpected interface {other}"),
                };
                assert!(built.is_ok(), "{interface}/{kind} failed to build");
            }
        }
    }

    #[test]
    fn unknown_type_names_the_offender() {
        let err = build_relational_db(&cfg(json!({"type": "OracleAdapter"})))
            .map(|_| ())
            .unwrap_err();
        let body = err.to_body();
        assert_eq!(body.error_code, "configuration_error");
        assert!(body.message.contains("OracleAdapter"));
        assert!(body.message.contains("relational_db"));
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = build_graph_db(&AdapterConfig::empty()).map(|_| ()).unwrap_err();
        assert!(err.to_body().message.contains("graph_db"));
    }

    #[test]
    fn types_do_not_cross_interfaces() {
        assert!(build_vector_db(&cfg(json!({"type": "PostgresAdapter"}))).is_err());
        assert!(build_message_bus(&cfg(json!({"type": "MinioAdapter"}))).is_err());
    }
}
