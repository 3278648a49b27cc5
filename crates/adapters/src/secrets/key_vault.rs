//! Azure Key Vault adapter.
//!
//! Authenticates with a client-credentials token from Microsoft Entra,
//! cached until shortly before expiry. Key Vault secret names only allow
//! alphanumerics and dashes, so other separators in caller names are mapped
//! to dashes (`db/password` becomes `db-password`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::instrument;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{SecretMetadata, SecretVersion, SecretsManager};

use crate::config_map::AdapterConfig;

const SERVICE: &str = "azure_key_vault";
const API_VERSION: &str = "7.4";
const TOKEN_SCOPE: &str = "https://vault.azure.net/.default";
/// Refresh the token this long before it actually expires.
const TOKEN_SLACK_SECS: i64 = 60;

pub struct AzureKeyVaultAdapter {
    http: reqwest::Client,
    vault_url: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    login_url: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AzureKeyVaultAdapter {
    /// Requires `vault_name` (or a full `endpoint`) plus `tenant_id`,
    /// `client_id` and `client_secret`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let vault_url = cfg.str_or(
            "endpoint",
            &format!("https://{}.vault.azure.net", cfg.str_or("vault_name", "cloudlift")),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.u64_or("request_timeout_secs", 30)))
            .build()
            .map_err(|e| wrap("client", e.to_string(), None, Some(Box::new(e))))?;
        Ok(Self {
            http,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            tenant_id: cfg.str_or("tenant_id", ""),
            client_id: cfg.str_or("client_id", ""),
            client_secret: cfg.str_or("client_secret", ""),
            login_url: cfg.str_or("login_url", "https://login.microsoftonline.com"),
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String, InfrastructureError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }
        let response = self
            .http
            .post(format!("{}/{}/oauth2/v2.0/token", self.login_url, self.tenant_id))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| wrap("authenticate", e.to_string(), None, Some(Box::new(e))))?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let description = payload["error_description"].as_str().unwrap_or("token request failed");
            return Err(wrap("authenticate", description.to_string(), None, None));
        }
        let value = payload["access_token"]
            .as_str()
            .ok_or_else(|| wrap("authenticate", "token response without access_token", None, None))?
            .to_string();
        let ttl = payload["expires_in"].as_i64().unwrap_or(300);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds((ttl - TOKEN_SLACK_SECS).max(30)),
        });
        Ok(value)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        operation: &str,
        name: Option<&str>,
    ) -> Result<(StatusCode, Value), InfrastructureError> {
        let token = self.bearer_token().await?;
        let url = format!("{}{path}", self.vault_url);
        let url = if url.contains('?') {
            format!("{url}&api-version={API_VERSION}")
        } else {
            format!("{url}?api-version={API_VERSION}")
        };
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| wrap(operation, e.to_string(), name, Some(Box::new(e))))?;
        let status = response.status();
        let payload = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, payload))
    }

    /// Like [`call`], but maps 404 to `SecretNotFound` and any other failure
    /// to a `Secrets` error.
    async fn call_ok(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        operation: &str,
        name: &str,
    ) -> Result<Value, InfrastructureError> {
        let (status, payload) = self.call(method, path, body, operation, Some(name)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(InfrastructureError::SecretNotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("http status {status}"));
            return Err(wrap(operation, message, Some(name), None));
        }
        Ok(payload)
    }
}

#[async_trait]
impl SecretsManager for AzureKeyVaultAdapter {
    async fn get_secret(&self, name: &str) -> Result<String, InfrastructureError> {
        let payload = self
            .call_ok(
                Method::GET,
                &format!("/secrets/{}", vault_name(name)),
                None,
                "get_secret",
                name,
            )
            .await?;
        Ok(payload["value"].as_str().unwrap_or_default().to_string())
    }

    async fn get_secret_json(&self, name: &str) -> Result<Value, InfrastructureError> {
        let raw = self.get_secret(name).await?;
        serde_json::from_str(&raw).map_err(|e| {
            wrap(
                "get_secret_json",
                format!("secret is not valid JSON: {e}"),
                Some(name),
                Some(Box::new(e)),
            )
        })
    }

    #[instrument(skip(self, value), err)]
    async fn set_secret(&self, name: &str, value: &str) -> Result<String, InfrastructureError> {
        let payload = self
            .call_ok(
                Method::PUT,
                &format!("/secrets/{}", vault_name(name)),
                Some(json!({"value": value})),
                "set_secret",
                name,
            )
            .await?;
        Ok(version_of(&payload["id"]))
    }

    async fn set_secret_json(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<String, InfrastructureError> {
        self.set_secret(name, &value.to_string()).await
    }

    #[instrument(skip(self), err)]
    async fn delete_secret(&self, name: &str) -> Result<(), InfrastructureError> {
        match self
            .call_ok(
                Method::DELETE,
                &format!("/secrets/{}", vault_name(name)),
                None,
                "delete_secret",
                name,
            )
            .await
        {
            Ok(_) | Err(InfrastructureError::SecretNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn secret_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        match self.get_secret(name).await {
            Ok(_) => Ok(true),
            Err(InfrastructureError::SecretNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_secrets(
        &self,
        prefix: Option<&str>,
        tags: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<String>, InfrastructureError> {
        let mut names = Vec::new();
        let mut path = "/secrets".to_string();
        loop {
            let payload = self
                .call_ok(Method::GET, &path, None, "list_secrets", "")
                .await?;
            for entry in payload["value"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
                let name = secret_name_of(&entry["id"]);
                if name.is_empty() {
                    continue;
                }
                if prefix.is_some_and(|p| !name.starts_with(&vault_name(p))) {
                    continue;
                }
                if let Some(tags) = tags {
                    let entry_tags = entry["tags"].as_object();
                    let matches = tags.iter().all(|(k, v)| {
                        entry_tags.is_some_and(|t| t.get(k).and_then(Value::as_str) == Some(v))
                    });
                    if !matches {
                        continue;
                    }
                }
                names.push(name);
            }
            match payload["nextLink"].as_str() {
                // nextLink is absolute; keep only the path and query.
                Some(link) => match link.strip_prefix(&self.vault_url) {
                    Some(rest) => path = rest.to_string(),
                    None => break,
                },
                None => break,
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get_secret_metadata(
        &self,
        name: &str,
    ) -> Result<SecretMetadata, InfrastructureError> {
        let payload = self
            .call_ok(
                Method::GET,
                &format!("/secrets/{}", vault_name(name)),
                None,
                "get_secret_metadata",
                name,
            )
            .await?;
        let mut tags = BTreeMap::new();
        if let Some(map) = payload["tags"].as_object() {
            for (key, value) in map {
                if let Some(value) = value.as_str() {
                    tags.insert(key.clone(), value.to_string());
                }
            }
        }
        Ok(SecretMetadata {
            name: name.to_string(),
            version: version_of(&payload["id"]),
            created_at: epoch_time(&payload["attributes"]["created"]),
            last_modified: epoch_time(&payload["attributes"]["updated"]),
            description: payload["contentType"].as_str().map(str::to_string),
            tags,
        })
    }

    async fn rotate_secret(
        &self,
        name: &str,
        new_value: &str,
    ) -> Result<String, InfrastructureError> {
        // Ensure the secret exists before minting a new version.
        self.get_secret(name).await?;
        self.set_secret(name, new_value).await
    }

    async fn get_secret_versions(
        &self,
        name: &str,
    ) -> Result<Vec<SecretVersion>, InfrastructureError> {
        let current = self
            .call_ok(
                Method::GET,
                &format!("/secrets/{}", vault_name(name)),
                None,
                "get_secret_versions",
                name,
            )
            .await?;
        let current_version = version_of(&current["id"]);
        let payload = self
            .call_ok(
                Method::GET,
                &format!("/secrets/{}/versions", vault_name(name)),
                None,
                "get_secret_versions",
                name,
            )
            .await?;
        let mut versions: Vec<SecretVersion> = payload["value"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|entry| {
                let version = version_of(&entry["id"]);
                SecretVersion {
                    is_current: version == current_version,
                    created_at: epoch_time(&entry["attributes"]["created"]),
                    version,
                }
            })
            .collect();
        versions.sort_by_key(|v| v.created_at);
        Ok(versions)
    }

    async fn get_secret_by_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<String, InfrastructureError> {
        let payload = self
            .call_ok(
                Method::GET,
                &format!("/secrets/{}/{version}", vault_name(name)),
                None,
                "get_secret_by_version",
                name,
            )
            .await?;
        Ok(payload["value"].as_str().unwrap_or_default().to_string())
    }

    async fn health_check(&self) -> bool {
        matches!(
            self.call(Method::GET, "/secrets?maxresults=1", None, "health_check", None).await,
            Ok((status, _)) if status.is_success()
        )
    }
}

/// Caller name -> Key Vault secret name (alphanumerics and dashes only).
fn vault_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Version id: last path segment of a secret id URL like
/// `https://v.vault.azure.net/secrets/name/abc123`.
fn version_of(id: &Value) -> String {
    id.as_str()
        .and_then(|id| id.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}

/// Secret name: second-to-last path segment of a secret list id (which has
/// no version suffix, so it is the last segment there).
fn secret_name_of(id: &Value) -> String {
    let Some(id) = id.as_str() else {
        return String::new();
    };
    id.split_once("/secrets/")
        .map(|(_, rest)| rest.split('/').next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

fn epoch_time(value: &Value) -> DateTime<Utc> {
    value
        .as_i64()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

fn wrap(
    operation: &str,
    message: impl Into<String>,
    name: Option<&str>,
    source: Option<cloudlift_core::BoxError>,
) -> InfrastructureError {
    InfrastructureError::Secrets {
        service: SERVICE.to_string(),
        operation: operation.to_string(),
        message: message.into(),
        name: name.map(str::to_string),
        source,
    }
}
