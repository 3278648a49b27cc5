//! Graph database contract (dependency graphs between discovered systems).

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cloudlift_core::InfrastructureError;

/// A node projected out of the backing graph store.
///
/// `id` is the backend's element id rendered as an opaque string; it is only
/// meaningful to the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub labels: BTreeSet<String>,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start_node_id: String,
    pub end_node_id: String,
    pub properties: Map<String, Value>,
}

/// A path between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

/// Traversal direction for neighbor queries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

#[async_trait]
pub trait GraphDb: Send + Sync {
    async fn create_node(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError>;

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>, InfrastructureError>;

    /// Merge `properties` into the node (existing keys are overwritten,
    /// others kept).
    async fn update_node(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError>;

    /// Delete a node and its relationships. Returns false if absent.
    async fn delete_node(&self, id: &str) -> Result<bool, InfrastructureError>;

    async fn create_relationship(
        &self,
        rel_type: &str,
        start_node_id: &str,
        end_node_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError>;

    async fn get_relationship(
        &self,
        id: &str,
    ) -> Result<Option<GraphRelationship>, InfrastructureError>;

    async fn update_relationship(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError>;

    async fn delete_relationship(&self, id: &str) -> Result<bool, InfrastructureError>;

    /// Run a raw Cypher query with named parameters; rows come back as
    /// column-name to JSON value maps.
    async fn execute_query(
        &self,
        cypher: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>, InfrastructureError>;

    /// Find nodes matching all given labels and property equalities.
    async fn find_nodes(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<GraphNode>, InfrastructureError>;

    /// Find paths between two nodes up to `max_depth` hops, optionally
    /// restricted to the given relationship types.
    async fn find_paths(
        &self,
        start_node_id: &str,
        end_node_id: &str,
        max_depth: usize,
        relationship_types: Option<&[String]>,
    ) -> Result<Vec<GraphPath>, InfrastructureError>;

    async fn get_neighbors(
        &self,
        node_id: &str,
        relationship_types: Option<&[String]>,
        direction: Direction,
    ) -> Result<Vec<GraphNode>, InfrastructureError>;

    async fn health_check(&self) -> bool;
}
