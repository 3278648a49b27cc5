//! Object storage contract (uploaded assessment documents, reports).

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use cloudlift_core::InfrastructureError;

/// Immutable snapshot of a stored blob's metadata at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// HTTP method a presigned URL authorizes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresignMethod {
    Get,
    Put,
}

/// Lazy, finite sequence of byte chunks. Not restartable; reopen the object
/// to read it again.
pub type ByteStream = BoxStream<'static, Result<Bytes, InfrastructureError>>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store an object, returning its etag (empty string if the backend
    /// reports none).
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<String, InfrastructureError>;

    /// Fetch the full object. `ObjectNotFound` if the key is absent.
    async fn get_object(&self, key: &str) -> Result<Bytes, InfrastructureError>;

    /// Stream the object's bytes. `ObjectNotFound` if the key is absent.
    async fn get_object_stream(&self, key: &str) -> Result<ByteStream, InfrastructureError>;

    /// Delete an object. Deleting an absent key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), InfrastructureError>;

    async fn object_exists(&self, key: &str) -> Result<bool, InfrastructureError>;

    async fn get_object_metadata(&self, key: &str)
    -> Result<ObjectMetadata, InfrastructureError>;

    /// List objects under a prefix, lexicographic key order.
    async fn list_objects(
        &self,
        prefix: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectMetadata>, InfrastructureError>;

    /// Generate a presigned URL valid for `expiration_secs`.
    async fn generate_presigned_url(
        &self,
        key: &str,
        expiration_secs: u64,
        method: PresignMethod,
    ) -> Result<String, InfrastructureError>;

    async fn copy_object(&self, from: &str, to: &str) -> Result<(), InfrastructureError>;

    async fn health_check(&self) -> bool;
}
