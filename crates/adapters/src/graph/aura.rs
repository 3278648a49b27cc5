//! Neo4j Aura adapter: the managed-cloud profile.
//!
//! Same query surface as [`Neo4jAdapter`]; differs in defaults (HTTPS on
//! 443, credentials expected from config/secrets, shorter timeout retries
//! left to Aura's front door).

use async_trait::async_trait;
use serde_json::{Map, Value};

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{Direction, GraphDb, GraphNode, GraphPath, GraphRelationship};

use crate::config_map::AdapterConfig;

use super::neo4j::Neo4jAdapter;

#[derive(Debug)]
pub struct Neo4jAuraAdapter {
    inner: Neo4jAdapter,
}

impl Neo4jAuraAdapter {
    /// Defaults: `https://{host}` (host `localhost`), database `neo4j`.
    /// Aura URIs look like `https://xxxxxxxx.databases.neo4j.io`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or(
            "endpoint",
            &format!("https://{}", cfg.str_or("host", "localhost")),
        );
        Ok(Self {
            inner: Neo4jAdapter::with_endpoint(cfg, &endpoint)?,
        })
    }
}

#[async_trait]
impl GraphDb for Neo4jAuraAdapter {
    async fn create_node(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError> {
        self.inner.create_node(labels, properties).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>, InfrastructureError> {
        self.inner.get_node(id).await
    }

    async fn update_node(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError> {
        self.inner.update_node(id, properties).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool, InfrastructureError> {
        self.inner.delete_node(id).await
    }

    async fn create_relationship(
        &self,
        rel_type: &str,
        start_node_id: &str,
        end_node_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError> {
        self.inner
            .create_relationship(rel_type, start_node_id, end_node_id, properties)
            .await
    }

    async fn get_relationship(
        &self,
        id: &str,
    ) -> Result<Option<GraphRelationship>, InfrastructureError> {
        self.inner.get_relationship(id).await
    }

    async fn update_relationship(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError> {
        self.inner.update_relationship(id, properties).await
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool, InfrastructureError> {
        self.inner.delete_relationship(id).await
    }

    async fn execute_query(
        &self,
        cypher: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>, InfrastructureError> {
        self.inner.execute_query(cypher, params).await
    }

    async fn find_nodes(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<GraphNode>, InfrastructureError> {
        self.inner.find_nodes(labels, properties, limit).await
    }

    async fn find_paths(
        &self,
        start_node_id: &str,
        end_node_id: &str,
        max_depth: usize,
        relationship_types: Option<&[String]>,
    ) -> Result<Vec<GraphPath>, InfrastructureError> {
        self.inner
            .find_paths(start_node_id, end_node_id, max_depth, relationship_types)
            .await
    }

    async fn get_neighbors(
        &self,
        node_id: &str,
        relationship_types: Option<&[String]>,
        direction: Direction,
    ) -> Result<Vec<GraphNode>, InfrastructureError> {
        self.inner
            .get_neighbors(node_id, relationship_types, direction)
            .await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
