//! AWS Secrets Manager adapter.
//!
//! Speaks the `x-amz-json-1.1` target protocol directly: every call is a
//! signed POST to `/` with an `X-Amz-Target` header naming the operation.
//! Works against LocalStack with an `endpoint` override.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::instrument;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{SecretMetadata, SecretVersion, SecretsManager};

use crate::config_map::AdapterConfig;
use crate::sign::SigV4Signer;

const SERVICE: &str = "aws_secrets_manager";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

pub struct AwsSecretsManagerAdapter {
    http: reqwest::Client,
    endpoint: String,
    signer: SigV4Signer,
}

impl AwsSecretsManagerAdapter {
    /// Defaults: region `us-east-1`, endpoint
    /// `https://secretsmanager.{region}.amazonaws.com`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let region = cfg.str_or("region", "us-east-1");
        let endpoint = cfg.str_or(
            "endpoint",
            &format!("https://secretsmanager.{region}.amazonaws.com"),
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.u64_or("request_timeout_secs", 30)))
            .build()
            .map_err(|e| wrap("client", e.to_string(), None, Some(Box::new(e))))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            signer: SigV4Signer::new(
                cfg.str_or("access_key", "test"),
                cfg.str_or("secret_key", "test"),
                region,
                "secretsmanager",
            ),
        })
    }

    async fn call(
        &self,
        target_op: &str,
        operation: &str,
        name: Option<&str>,
        body: Value,
    ) -> Result<Value, InfrastructureError> {
        let target = format!("secretsmanager.{target_op}");
        let body = body.to_string();
        let signed = self.signer.sign_post(
            &host_of(&self.endpoint),
            "/",
            body.as_bytes(),
            CONTENT_TYPE,
            &[("x-amz-target".to_string(), target.clone())],
            Utc::now(),
        );
        let response = self
            .http
            .post(&self.endpoint)
            .header("authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-target", target)
            .header("content-type", CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| wrap(operation, e.to_string(), name, Some(Box::new(e))))?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let error_type = payload["__type"].as_str().unwrap_or("").to_string();
            if error_type.contains("ResourceNotFoundException") {
                return Err(InfrastructureError::SecretNotFound {
                    name: name.unwrap_or_default().to_string(),
                });
            }
            let message = payload["message"]
                .as_str()
                .or_else(|| payload["Message"].as_str())
                .unwrap_or("unknown error");
            return Err(wrap(operation, format!("{error_type}: {message}"), name, None));
        }
        Ok(payload)
    }

    async fn put_value(&self, name: &str, value: &str) -> Result<String, InfrastructureError> {
        let result = self
            .call(
                "PutSecretValue",
                "set_secret",
                Some(name),
                json!({"SecretId": name, "SecretString": value}),
            )
            .await?;
        Ok(result["VersionId"].as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl SecretsManager for AwsSecretsManagerAdapter {
    async fn get_secret(&self, name: &str) -> Result<String, InfrastructureError> {
        let result = self
            .call(
                "GetSecretValue",
                "get_secret",
                Some(name),
                json!({"SecretId": name}),
            )
            .await?;
        result["SecretString"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| wrap("get_secret", "secret has no string value", Some(name), None))
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
        match self.put_value(name, value).await {
            Err(InfrastructureError::SecretNotFound { .. }) => {
                let result = self
                    .call(
                        "CreateSecret",
                        "set_secret",
                        Some(name),
                        json!({"Name": name, "SecretString": value}),
                    )
                    .await?;
                Ok(result["VersionId"].as_str().unwrap_or_default().to_string())
            }
            other => other,
        }
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
            .call(
                "DeleteSecret",
                "delete_secret",
                Some(name),
                json!({"SecretId": name, "ForceDeleteWithoutRecovery": true}),
            )
            .await
        {
            Ok(_) | Err(InfrastructureError::SecretNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn secret_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        match self
            .call(
                "DescribeSecret",
                "secret_exists",
                Some(name),
                json!({"SecretId": name}),
            )
            .await
        {
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
        let mut filters = Vec::new();
        if let Some(prefix) = prefix {
            filters.push(json!({"Key": "name", "Values": [prefix]}));
        }
        if let Some(tags) = tags {
            for (key, value) in tags {
                filters.push(json!({"Key": "tag-key", "Values": [key]}));
                filters.push(json!({"Key": "tag-value", "Values": [value]}));
            }
        }
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut body = Map::new();
            if !filters.is_empty() {
                body.insert("Filters".into(), Value::Array(filters.clone()));
            }
            if let Some(token) = &next_token {
                body.insert("NextToken".into(), json!(token));
            }
            let result = self
                .call("ListSecrets", "list_secrets", None, Value::Object(body))
                .await?;
            for entry in result["SecretList"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(name) = entry["Name"].as_str() {
                    names.push(name.to_string());
                }
            }
            next_token = result["NextToken"].as_str().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get_secret_metadata(
        &self,
        name: &str,
    ) -> Result<SecretMetadata, InfrastructureError> {
        let result = self
            .call(
                "DescribeSecret",
                "get_secret_metadata",
                Some(name),
                json!({"SecretId": name}),
            )
            .await?;
        let current = result["VersionIdsToStages"]
            .as_object()
            .and_then(|stages| {
                stages.iter().find_map(|(version, labels)| {
                    labels
                        .as_array()
                        .is_some_and(|l| l.iter().any(|s| s == "AWSCURRENT"))
                        .then(|| version.clone())
                })
            })
            .unwrap_or_default();
        let mut tags = BTreeMap::new();
        for tag in result["Tags"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            if let (Some(key), Some(value)) = (tag["Key"].as_str(), tag["Value"].as_str()) {
                tags.insert(key.to_string(), value.to_string());
            }
        }
        Ok(SecretMetadata {
            name: result["Name"].as_str().unwrap_or(name).to_string(),
            version: current,
            created_at: epoch_time(&result["CreatedDate"]),
            last_modified: epoch_time(&result["LastChangedDate"]),
            description: result["Description"].as_str().map(str::to_string),
            tags,
        })
    }

    async fn rotate_secret(
        &self,
        name: &str,
        new_value: &str,
    ) -> Result<String, InfrastructureError> {
        self.put_value(name, new_value).await
    }

    async fn get_secret_versions(
        &self,
        name: &str,
    ) -> Result<Vec<SecretVersion>, InfrastructureError> {
        let result = self
            .call(
                "ListSecretVersionIds",
                "get_secret_versions",
                Some(name),
                json!({"SecretId": name, "IncludeDeprecated": true}),
            )
            .await?;
        let mut versions: Vec<SecretVersion> = result["Versions"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|v| {
                Some(SecretVersion {
                    version: v["VersionId"].as_str()?.to_string(),
                    created_at: epoch_time(&v["CreatedDate"]),
                    is_current: v["VersionStages"]
                        .as_array()
                        .is_some_and(|stages| stages.iter().any(|s| s == "AWSCURRENT")),
                })
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
        let result = self
            .call(
                "GetSecretValue",
                "get_secret_by_version",
                Some(name),
                json!({"SecretId": name, "VersionId": version}),
            )
            .await?;
        result["SecretString"].as_str().map(str::to_string).ok_or_else(|| {
            wrap("get_secret_by_version", "secret has no string value", Some(name), None)
        })
    }

    async fn health_check(&self) -> bool {
        self.call("ListSecrets", "health_check", None, json!({"MaxResults": 1}))
            .await
            .is_ok()
    }
}

fn epoch_time(value: &Value) -> DateTime<Utc> {
    value
        .as_f64()
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or_default()
}

fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_times_convert() {
        let at = epoch_time(&json!(1_700_000_000.5));
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(epoch_time(&Value::Null), DateTime::<Utc>::default());
    }

    #[test]
    fn endpoint_host_extraction() {
        assert_eq!(
            host_of("https://secretsmanager.eu-west-1.amazonaws.com"),
            "secretsmanager.eu-west-1.amazonaws.com"
        );
        assert_eq!(host_of("http://localhost:4566/"), "localhost:4566");
    }
}
