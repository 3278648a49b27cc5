//! Shared `object_store` plumbing for the storage adapters.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, ObjectStore, PutOptions, PutPayload,
};
use tracing::instrument;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{ByteStream, ObjectMetadata, PresignMethod};

/// One bucket/container on one `object_store` backend.
///
/// `list_objects` reports only what the backend's listing carries (key, size,
/// last-modified, etag); content type and user metadata require a
/// `get_object_metadata` per key.
pub(crate) struct StoreCore {
    service: &'static str,
    bucket: String,
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
}

impl std::fmt::Debug for StoreCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCore")
            .field("service", &self.service)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl StoreCore {
    pub fn new(
        service: &'static str,
        bucket: String,
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            service,
            bucket,
            store,
            signer,
        }
    }

    #[instrument(skip(self, data, metadata), fields(service = self.service), err)]
    pub async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError> {
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        if let Some(metadata) = metadata {
            for (name, value) in metadata {
                attributes.insert(
                    Attribute::Metadata(Cow::Owned(name.clone())),
                    AttributeValue::from(value.clone()),
                );
            }
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };
        let result = self
            .store
            .put_opts(&Path::from(key), PutPayload::from(data), options)
            .await
            .map_err(|e| self.wrap("put_object", Some(key), e))?;
        Ok(result.e_tag.unwrap_or_default())
    }

    pub async fn get_object(&self, key: &str) -> Result<Bytes, InfrastructureError> {
        self.store
            .get(&Path::from(key))
            .await
            .map_err(|e| self.wrap("get_object", Some(key), e))?
            .bytes()
            .await
            .map_err(|e| self.wrap("get_object", Some(key), e))
    }

    pub async fn get_object_stream(&self, key: &str) -> Result<ByteStream, InfrastructureError> {
        let result = self
            .store
            .get(&Path::from(key))
            .await
            .map_err(|e| self.wrap("get_object_stream", Some(key), e))?;
        let service = self.service;
        let bucket = self.bucket.clone();
        let key = key.to_string();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| InfrastructureError::ObjectStorage {
                service: service.to_string(),
                operation: "get_object_stream".to_string(),
                message: e.to_string(),
                bucket: Some(bucket.clone()),
                key: Some(key.clone()),
                source: Some(Box::new(e)),
            })
        });
        Ok(stream.boxed())
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), InfrastructureError> {
        match self.store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(self.wrap("delete_object", Some(key), e)),
        }
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool, InfrastructureError> {
        match self.store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(self.wrap("object_exists", Some(key), e)),
        }
    }

    pub async fn get_object_metadata(
        &self,
        key: &str,
    ) -> Result<ObjectMetadata, InfrastructureError> {
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .store
            .get_opts(&Path::from(key), options)
            .await
            .map_err(|e| self.wrap("get_object_metadata", Some(key), e))?;
        let mut content_type = None;
        let mut metadata = BTreeMap::new();
        for (attribute, value) in result.attributes.iter() {
            match attribute {
                Attribute::ContentType => content_type = Some(value.to_string()),
                Attribute::Metadata(name) => {
                    metadata.insert(name.to_string(), value.to_string());
                }
                _ => {}
            }
        }
        Ok(ObjectMetadata {
            key: result.meta.location.to_string(),
            size: result.meta.size as u64,
            last_modified: result.meta.last_modified,
            etag: result.meta.e_tag.clone(),
            content_type,
            metadata,
        })
    }

    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectMetadata>, InfrastructureError> {
        let prefix_path = prefix.map(Path::from);
        let mut stream = self.store.list(prefix_path.as_ref());
        let mut out = Vec::new();
        while let Some(entry) = stream.next().await {
            let meta = entry.map_err(|e| self.wrap("list_objects", prefix, e))?;
            out.push(ObjectMetadata {
                key: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: meta.last_modified,
                etag: meta.e_tag,
                content_type: None,
                metadata: BTreeMap::new(),
            });
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    #[instrument(skip(self), fields(service = self.service), err)]
    pub async fn generate_presigned_url(
        &self,
        key: &str,
        expiration_secs: u64,
        method: PresignMethod,
    ) -> Result<String, InfrastructureError> {
        let http_method = match method {
            PresignMethod::Get => http::Method::GET,
            PresignMethod::Put => http::Method::PUT,
        };
        let url = self
            .signer
            .signed_url(
                http_method,
                &Path::from(key),
                Duration::from_secs(expiration_secs),
            )
            .await
            .map_err(|e| self.wrap("generate_presigned_url", Some(key), e))?;
        Ok(url.to_string())
    }

    pub async fn copy_object(&self, from: &str, to: &str) -> Result<(), InfrastructureError> {
        self.store
            .copy(&Path::from(from), &Path::from(to))
            .await
            .map_err(|e| self.wrap("copy_object", Some(from), e))
    }

    pub async fn health_check(&self) -> bool {
        self.store.list_with_delimiter(None).await.is_ok()
    }

    fn wrap(
        &self,
        operation: &str,
        key: Option<&str>,
        err: object_store::Error,
    ) -> InfrastructureError {
        match err {
            object_store::Error::NotFound { path, .. } => InfrastructureError::ObjectNotFound {
                bucket: self.bucket.clone(),
                key: key.map(str::to_string).unwrap_or(path),
            },
            other => InfrastructureError::ObjectStorage {
                service: self.service.to_string(),
                operation: operation.to_string(),
                message: other.to_string(),
                bucket: Some(self.bucket.clone()),
                key: key.map(str::to_string),
                source: Some(Box::new(other)),
            },
        }
    }
}

/// Build failure for a storage backend (bad config values, malformed
/// endpoint).
pub(crate) fn build_error(service: &'static str, err: object_store::Error) -> InfrastructureError {
    InfrastructureError::ObjectStorage {
        service: service.to_string(),
        operation: "configure".to_string(),
        message: err.to_string(),
        bucket: None,
        key: None,
        source: Some(Box::new(err)),
    }
}
