//! Environment-variable secrets for local development.
//!
//! Reads fall through to process environment variables; writes land in an
//! in-process versioned overlay, which also shadows the environment (so a
//! `set_secret` or `delete_secret` wins over an inherited variable). Secret
//! names map to variable names by uppercasing and replacing separators, e.g.
//! `db/password` reads `DB_PASSWORD` (plus the configured `prefix`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{SecretMetadata, SecretVersion, SecretsManager};

use crate::config_map::AdapterConfig;

const SERVICE: &str = "environment";

pub struct EnvironmentSecretsAdapter {
    prefix: String,
    overlay: Mutex<HashMap<String, SecretEntry>>,
}

struct SecretEntry {
    versions: Vec<StoredVersion>,
    deleted: bool,
    created_at: DateTime<Utc>,
}

struct StoredVersion {
    version: String,
    value: String,
    created_at: DateTime<Utc>,
}

impl SecretEntry {
    fn current(&self) -> Option<&StoredVersion> {
        if self.deleted { None } else { self.versions.last() }
    }
}

impl EnvironmentSecretsAdapter {
    /// `prefix` is prepended to every environment variable lookup (default
    /// none). Listing only sees the overlay plus prefixed variables.
    pub fn from_config(cfg: &AdapterConfig) -> Self {
        Self {
            prefix: cfg.str_or("prefix", ""),
            overlay: Mutex::new(HashMap::new()),
        }
    }

    fn env_key(&self, name: &str) -> String {
        let mapped: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{mapped}", self.prefix)
    }

    fn read(&self, name: &str) -> Option<String> {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = overlay.get(name) {
            return entry.current().map(|v| v.value.clone());
        }
        drop(overlay);
        std::env::var(self.env_key(name)).ok()
    }

    fn store(&self, name: &str, value: &str) -> String {
        let now = Utc::now();
        let mut overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        let entry = overlay.entry(name.to_string()).or_insert_with(|| SecretEntry {
            versions: Vec::new(),
            deleted: false,
            created_at: now,
        });
        entry.deleted = false;
        let version = format!("v{}", entry.versions.len() + 1);
        entry.versions.push(StoredVersion {
            version: version.clone(),
            value: value.to_string(),
            created_at: now,
        });
        version
    }
}

fn not_found(name: &str) -> InfrastructureError {
    InfrastructureError::SecretNotFound {
        name: name.to_string(),
    }
}

#[async_trait]
impl SecretsManager for EnvironmentSecretsAdapter {
    async fn get_secret(&self, name: &str) -> Result<String, InfrastructureError> {
        self.read(name).ok_or_else(|| not_found(name))
    }

    async fn get_secret_json(&self, name: &str) -> Result<Value, InfrastructureError> {
        let raw = self.get_secret(name).await?;
        serde_json::from_str(&raw).map_err(|e| InfrastructureError::Secrets {
            service: SERVICE.to_string(),
            operation: "get_secret_json".to_string(),
            message: format!("secret is not valid JSON: {e}"),
            name: Some(name.to_string()),
            source: Some(Box::new(e)),
        })
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<String, InfrastructureError> {
        Ok(self.store(name, value))
    }

    async fn set_secret_json(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<String, InfrastructureError> {
        Ok(self.store(name, &value.to_string()))
    }

    async fn delete_secret(&self, name: &str) -> Result<(), InfrastructureError> {
        let mut overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        // Tombstone so an inherited environment variable stays shadowed.
        let entry = overlay.entry(name.to_string()).or_insert_with(|| SecretEntry {
            versions: Vec::new(),
            deleted: false,
            created_at: Utc::now(),
        });
        entry.deleted = true;
        Ok(())
    }

    async fn secret_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        Ok(self.read(name).is_some())
    }

    async fn list_secrets(
        &self,
        prefix: Option<&str>,
        tags: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>, InfrastructureError> {
        // Overlay entries carry no tags; any tag filter matches nothing.
        if tags.is_some_and(|t| !t.is_empty()) {
            return Ok(Vec::new());
        }
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = overlay
            .iter()
            .filter(|(_, entry)| entry.current().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        if !self.prefix.is_empty() {
            for (key, _) in std::env::vars() {
                if let Some(stripped) = key.strip_prefix(&self.prefix) {
                    let name = stripped.to_ascii_lowercase();
                    if !overlay.contains_key(&name) {
                        names.push(name);
                    }
                }
            }
        }
        if let Some(prefix) = prefix {
            names.retain(|n| n.starts_with(prefix));
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn get_secret_metadata(
        &self,
        name: &str,
    ) -> Result<SecretMetadata, InfrastructureError> {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = overlay.get(name) {
            let current = entry.current().ok_or_else(|| not_found(name))?;
            return Ok(SecretMetadata {
                name: name.to_string(),
                version: current.version.clone(),
                created_at: entry.created_at,
                last_modified: current.created_at,
                description: None,
                tags: BTreeMap::new(),
            });
        }
        drop(overlay);
        if std::env::var(self.env_key(name)).is_ok() {
            let now = Utc::now();
            return Ok(SecretMetadata {
                name: name.to_string(),
                version: "env".to_string(),
                created_at: now,
                last_modified: now,
                description: Some("process environment variable".to_string()),
                tags: BTreeMap::new(),
            });
        }
        Err(not_found(name))
    }

    async fn rotate_secret(
        &self,
        name: &str,
        new_value: &str,
    ) -> Result<String, InfrastructureError> {
        if self.read(name).is_none() {
            return Err(not_found(name));
        }
        Ok(self.store(name, new_value))
    }

    async fn get_secret_versions(
        &self,
        name: &str,
    ) -> Result<Vec<SecretVersion>, InfrastructureError> {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = overlay.get(name) {
            if entry.deleted {
                return Err(not_found(name));
            }
            let last = entry.versions.len();
            return Ok(entry
                .versions
                .iter()
                .enumerate()
                .map(|(i, v)| SecretVersion {
                    version: v.version.clone(),
                    created_at: v.created_at,
                    is_current: i + 1 == last,
                })
                .collect());
        }
        drop(overlay);
        if std::env::var(self.env_key(name)).is_ok() {
            return Ok(vec![SecretVersion {
                version: "env".to_string(),
                created_at: Utc::now(),
                is_current: true,
            }]);
        }
        Err(not_found(name))
    }

    async fn get_secret_by_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, InfrastructureError> {
        let overlay = self.overlay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = overlay.get(name) {
            if !entry.deleted {
                if let Some(v) = entry.versions.iter().find(|v| v.version == version) {
                    return Ok(v.value.clone());
                }
            }
            return Err(not_found(name));
        }
        drop(overlay);
        if version == "env" {
            return std::env::var(self.env_key(name)).map_err(|_| not_found(name));
        }
        Err(not_found(name))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> EnvironmentSecretsAdapter {
        EnvironmentSecretsAdapter::from_config(&AdapterConfig::new(serde_json::Map::new()))
    }

    #[tokio::test]
    async fn reads_fall_through_to_the_environment() {
        unsafe { std::env::set_var("ENVSECRETS_FALLTHROUGH_A", "hunter2") };
        let secrets = adapter();
        assert_eq!(
            secrets.get_secret("envsecrets_fallthrough_a").await.unwrap(),
            "hunter2"
        );
        assert!(secrets.secret_exists("envsecrets_fallthrough_a").await.unwrap());
    }

    #[tokio::test]
    async fn missing_secret_is_a_not_found() {
        let secrets = adapter();
        let err = secrets.get_secret("definitely-absent").await.unwrap_err();
        assert!(matches!(err, InfrastructureError::SecretNotFound { .. }));
    }

    #[tokio::test]
    async fn set_then_rotate_versions_monotonically() {
        let secrets = adapter();
        let v1 = secrets.set_secret("api-key", "one").await.unwrap();
        let v2 = secrets.rotate_secret("api-key", "two").await.unwrap();
        assert_eq!(v1, "v1");
        assert_eq!(v2, "v2");
        assert_eq!(secrets.get_secret("api-key").await.unwrap(), "two");
        assert_eq!(secrets.get_secret_by_version("api-key", "v1").await.unwrap(), "one");

        let versions = secrets.get_secret_versions("api-key").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(!versions[0].is_current);
        assert!(versions[1].is_current);
    }

    #[tokio::test]
    async fn rotate_requires_an_existing_secret() {
        let secrets = adapter();
        assert!(secrets.rotate_secret("ghost", "x").await.is_err());
    }

    #[tokio::test]
    async fn overlay_shadows_and_delete_tombstones() {
        unsafe { std::env::set_var("ENVSECRETS_SHADOW_B", "from-env") };
        let secrets = adapter();
        secrets.set_secret("envsecrets_shadow_b", "from-overlay").await.unwrap();
        assert_eq!(
            secrets.get_secret("envsecrets_shadow_b").await.unwrap(),
            "from-overlay"
        );
        secrets.delete_secret("envsecrets_shadow_b").await.unwrap();
        assert!(secrets.get_secret("envsecrets_shadow_b").await.is_err());
        assert!(!secrets.secret_exists("envsecrets_shadow_b").await.unwrap());
    }

    #[tokio::test]
    async fn json_secrets_round_trip() {
        let secrets = adapter();
        secrets
            .set_secret_json("db", &json!({"user": "app", "password": "pw"}))
            .await
            .unwrap();
        let value = secrets.get_secret_json("db").await.unwrap();
        assert_eq!(value["user"], "app");

        secrets.set_secret("plain", "not json").await.unwrap();
        assert!(secrets.get_secret_json("plain").await.is_err());
    }

    #[tokio::test]
    async fn listing_filters_by_prefix() {
        let secrets = adapter();
        secrets.set_secret("db/password", "x").await.unwrap();
        secrets.set_secret("db/user", "y").await.unwrap();
        secrets.set_secret("api-key", "z").await.unwrap();
        let names = secrets.list_secrets(Some("db/"), None).await.unwrap();
        assert_eq!(names, vec!["db/password", "db/user"]);

        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        assert!(secrets.list_secrets(None, Some(&tags)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_tracks_the_current_version() {
        let secrets = adapter();
        secrets.set_secret("token", "a").await.unwrap();
        secrets.set_secret("token", "b").await.unwrap();
        let metadata = secrets.get_secret_metadata("token").await.unwrap();
        assert_eq!(metadata.version, "v2");
        assert_eq!(metadata.name, "token");
    }
}
