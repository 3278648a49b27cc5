//! Vector database contract (document embeddings for RAG retrieval).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cloudlift_core::InfrastructureError;

/// Distance metric for a collection's vector index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    L2,
}

/// A document with its embedding and arbitrary metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// One search hit. `score` is normalized to "higher is better" regardless of
/// the backend's metric; `distance` is the raw backend distance if reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: VectorDocument,
    pub score: f32,
    pub distance: Option<f32>,
}

#[async_trait]
pub trait VectorDb: Send + Sync {
    /// Create a collection. `metadata_schema` optionally declares typed,
    /// filterable metadata fields (name -> portable type such as `"text"`,
    /// `"number"`, `"boolean"`).
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance_metric: DistanceMetric,
        metadata_schema: Option<&Map<String, Value>>,
    ) -> Result<(), InfrastructureError>;

    async fn delete_collection(&self, name: &str) -> Result<(), InfrastructureError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, InfrastructureError>;

    async fn insert_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError>;

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<VectorDocument>, InfrastructureError>;

    async fn update_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError>;

    async fn delete_document(&self, collection: &str, id: &str)
    -> Result<(), InfrastructureError>;

    /// Nearest-neighbor search by embedding, descending score. Hits scoring
    /// below `min_score` are dropped. `metadata_filter` is a map of metadata
    /// field equalities that must all hold.
    async fn search_similar(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError>;

    /// Text search. The adapter embeds the text itself or delegates to the
    /// backend's native vectorizer; backends configured without one report a
    /// `Database` error.
    async fn search_by_text(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError>;

    /// Combined keyword + vector search. Weights may sum to any positive
    /// value; the adapter normalizes them internally. Results are ordered by
    /// descending combined score.
    #[allow(clippy::too_many_arguments)]
    async fn hybrid_search(
        &self,
        collection: &str,
        text: &str,
        vector: Option<&[f32]>,
        text_weight: f32,
        vector_weight: f32,
        limit: usize,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError>;

    async fn health_check(&self) -> bool;
}
