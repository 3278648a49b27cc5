//! Secrets manager contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cloudlift_core::InfrastructureError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub name: String,
    /// Current version id.
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

#[async_trait]
pub trait SecretsManager: Send + Sync {
    /// Fetch the current value. `SecretNotFound` if absent.
    async fn get_secret(&self, name: &str) -> Result<String, InfrastructureError>;

    /// Fetch and parse as JSON.
    async fn get_secret_json(&self, name: &str) -> Result<Value, InfrastructureError>;

    /// Create or update a secret; returns the new version id.
    async fn set_secret(&self, name: &str, value: &str) -> Result<String, InfrastructureError>;

    async fn set_secret_json(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<String, InfrastructureError>;

    async fn delete_secret(&self, name: &str) -> Result<(), InfrastructureError>;

    async fn secret_exists(&self, name: &str) -> Result<bool, InfrastructureError>;

    /// List secret names, optionally filtered by name prefix and tag
    /// equalities.
    async fn list_secrets(
        &self,
        prefix: Option<&str>,
        tags: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>, InfrastructureError>;

    async fn get_secret_metadata(
        &self,
        name: &str,
    ) -> Result<SecretMetadata, InfrastructureError>;

    /// Store a new value as the current version; returns the new version id.
    async fn rotate_secret(
        &self,
        name: &str,
        new_value: &str,
    ) -> Result<String, InfrastructureError>;

    async fn get_secret_versions(
        &self,
        name: &str,
    ) -> Result<Vec<SecretVersion>, InfrastructureError>;

    async fn get_secret_by_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, InfrastructureError>;

    async fn health_check(&self) -> bool;
}
