//! Weaviate Cloud adapter: the managed profile.
//!
//! Same API surface as [`WeaviateAdapter`]; defaults to HTTPS and expects an
//! `api_key` in config (cluster URLs look like
//! `https://xxxxxx.weaviate.network`).

use async_trait::async_trait;
use serde_json::{Map, Value};

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{DistanceMetric, SearchResult, VectorDb, VectorDocument};

use crate::config_map::AdapterConfig;

use super::weaviate::WeaviateAdapter;

#[derive(Debug)]
pub struct WeaviateCloudAdapter {
    inner: WeaviateAdapter,
}

impl WeaviateCloudAdapter {
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or(
            "endpoint",
            &format!("https://{}", cfg.str_or("host", "localhost")),
        );
        Ok(Self {
            inner: WeaviateAdapter::with_endpoint(cfg, &endpoint)?,
        })
    }
}

#[async_trait]
impl VectorDb for WeaviateCloudAdapter {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance_metric: DistanceMetric,
        metadata_schema: Option<&Map<String, Value>>,
    ) -> Result<(), InfrastructureError> {
        self.inner
            .create_collection(name, dimension, distance_metric, metadata_schema)
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<(), InfrastructureError> {
        self.inner.delete_collection(name).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        self.inner.collection_exists(name).await
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError> {
        self.inner.insert_document(collection, document).await
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<VectorDocument>, InfrastructureError> {
        self.inner.get_document(collection, id).await
    }

    async fn update_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError> {
        self.inner.update_document(collection, document).await
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<(), InfrastructureError> {
        self.inner.delete_document(collection, id).await
    }

    async fn search_similar(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError> {
        self.inner
            .search_similar(collection, vector, limit, min_score, metadata_filter)
            .await
    }

    async fn search_by_text(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError> {
        self.inner
            .search_by_text(collection, text, limit, min_score, metadata_filter)
            .await
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        text: &str,
        vector: Option<&[f32]>,
        text_weight: f32,
        vector_weight: f32,
        limit: usize,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError> {
        self.inner
            .hybrid_search(
                collection,
                text,
                vector,
                text_weight,
                vector_weight,
                limit,
                metadata_filter,
            )
            .await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
