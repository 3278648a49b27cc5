//! Neo4j adapter (self-hosted / Docker).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{Direction, GraphDb, GraphNode, GraphPath, GraphRelationship};

use crate::config_map::AdapterConfig;

use super::cypher::{
    CypherClient, first_node, first_relationship, ident_ok, node_from_json, parse_graph_id,
    relationship_from_json, wrap,
};

const SERVICE: &str = "neo4j";
const DEFAULT_FIND_LIMIT: usize = 100;
const DEFAULT_PATH_LIMIT: usize = 50;

/// Neo4j over the transactional HTTP endpoint.
#[derive(Debug)]
pub struct Neo4jAdapter {
    client: CypherClient,
}

impl Neo4jAdapter {
    /// Defaults: `http://localhost:7474`, database `neo4j`, credentials
    /// `neo4j`/`neo4j`, `request_timeout_secs` 30.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or(
            "endpoint",
            &format!(
                "http://{}:{}",
                cfg.str_or("host", "localhost"),
                cfg.u64_or("port", 7474)
            ),
        );
        Self::with_endpoint(cfg, &endpoint)
    }

    pub(crate) fn with_endpoint(
        cfg: &AdapterConfig,
        endpoint: &str,
    ) -> Result<Self, InfrastructureError> {
        let client = CypherClient::new(
            endpoint,
            &cfg.str_or("database", "neo4j"),
            cfg.str_or("username", "neo4j"),
            cfg.str_or("password", "neo4j"),
            Duration::from_secs(cfg.u64_or("request_timeout_secs", 30)),
            SERVICE,
        )?;
        Ok(Self { client })
    }

    fn label_fragment(labels: &[String]) -> Result<String, InfrastructureError> {
        let mut fragment = String::new();
        for label in labels {
            ident_ok(SERVICE, label)?;
            fragment.push_str(&format!(":`{label}`"));
        }
        Ok(fragment)
    }

    fn rel_type_fragment(types: Option<&[String]>) -> Result<String, InfrastructureError> {
        let Some(types) = types.filter(|t| !t.is_empty()) else {
            return Ok(String::new());
        };
        for t in types {
            ident_ok(SERVICE, t)?;
        }
        let joined = types
            .iter()
            .map(|t| format!("`{t}`"))
            .collect::<Vec<_>>()
            .join("|");
        Ok(format!(":{joined}"))
    }
}

#[async_trait]
impl GraphDb for Neo4jAdapter {
    #[instrument(skip(self, properties), err)]
    async fn create_node(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError> {
        let labels_fragment = Self::label_fragment(labels)?;
        let statement = format!("CREATE (n{labels_fragment}) SET n = $props RETURN n");
        let result = self
            .client
            .run(&statement, json!({"props": properties}), true)
            .await?;
        first_node(&result)
            .ok_or_else(|| wrap(SERVICE, "create_node", "no node returned".into(), None))
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH (n) WHERE id(n) = $id RETURN n",
                json!({"id": parse_graph_id(SERVICE, id)?}),
                true,
            )
            .await?;
        Ok(first_node(&result))
    }

    async fn update_node(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphNode, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH (n) WHERE id(n) = $id SET n += $props RETURN n",
                json!({"id": parse_graph_id(SERVICE, id)?, "props": properties}),
                true,
            )
            .await?;
        first_node(&result).ok_or_else(|| {
            wrap(SERVICE, "update_node", format!("node '{id}' not found"), None)
        })
    }

    async fn delete_node(&self, id: &str) -> Result<bool, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH (n) WHERE id(n) = $id DETACH DELETE n RETURN count(n) AS deleted",
                json!({"id": parse_graph_id(SERVICE, id)?}),
                false,
            )
            .await?;
        Ok(deleted_count(&result.rows) > 0)
    }

    #[instrument(skip(self, properties), err)]
    async fn create_relationship(
        &self,
        rel_type: &str,
        start_node_id: &str,
        end_node_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError> {
        ident_ok(SERVICE, rel_type)?;
        let statement = format!(
            "MATCH (a), (b) WHERE id(a) = $start AND id(b) = $end \
             CREATE (a)-[r:`{rel_type}`]->(b) SET r = $props RETURN r"
        );
        let result = self
            .client
            .run(
                &statement,
                json!({
                    "start": parse_graph_id(SERVICE, start_node_id)?,
                    "end": parse_graph_id(SERVICE, end_node_id)?,
                    "props": properties,
                }),
                true,
            )
            .await?;
        first_relationship(&result).ok_or_else(|| {
            wrap(
                SERVICE,
                "create_relationship",
                "start or end node not found".into(),
                None,
            )
        })
    }

    async fn get_relationship(
        &self,
        id: &str,
    ) -> Result<Option<GraphRelationship>, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH ()-[r]->() WHERE id(r) = $id RETURN r",
                json!({"id": parse_graph_id(SERVICE, id)?}),
                true,
            )
            .await?;
        Ok(first_relationship(&result))
    }

    async fn update_relationship(
        &self,
        id: &str,
        properties: &Map<String, Value>,
    ) -> Result<GraphRelationship, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH ()-[r]->() WHERE id(r) = $id SET r += $props RETURN r",
                json!({"id": parse_graph_id(SERVICE, id)?, "props": properties}),
                true,
            )
            .await?;
        first_relationship(&result).ok_or_else(|| {
            wrap(
                SERVICE,
                "update_relationship",
                format!("relationship '{id}' not found"),
                None,
            )
        })
    }

    async fn delete_relationship(&self, id: &str) -> Result<bool, InfrastructureError> {
        let result = self
            .client
            .run(
                "MATCH ()-[r]->() WHERE id(r) = $id DELETE r RETURN count(r) AS deleted",
                json!({"id": parse_graph_id(SERVICE, id)?}),
                false,
            )
            .await?;
        Ok(deleted_count(&result.rows) > 0)
    }

    #[instrument(skip(self, params), err)]
    async fn execute_query(
        &self,
        cypher: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>, InfrastructureError> {
        let result = self
            .client
            .run(cypher, Value::Object(params.clone()), false)
            .await?;
        Ok(result
            .rows
            .into_iter()
            .map(|row| {
                result
                    .columns
                    .iter()
                    .cloned()
                    .zip(row)
                    .collect::<Map<String, Value>>()
            })
            .collect())
    }

    async fn find_nodes(
        &self,
        labels: &[String],
        properties: &Map<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<GraphNode>, InfrastructureError> {
        let labels_fragment = Self::label_fragment(labels)?;
        let mut conditions = Vec::new();
        let mut params = Map::new();
        for (i, (key, value)) in properties.iter().enumerate() {
            ident_ok(SERVICE, key)?;
            let param = format!("p{i}");
            conditions.push(format!("n.`{key}` = ${param}"));
            params.insert(param, value.clone());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let statement = format!(
            "MATCH (n{labels_fragment}){where_clause} RETURN n LIMIT {}",
            limit.unwrap_or(DEFAULT_FIND_LIMIT)
        );
        let result = self.client.run(&statement, Value::Object(params), true).await?;
        Ok(result
            .graphs
            .iter()
            .flat_map(|g| g["nodes"].as_array().cloned().unwrap_or_default())
            .filter_map(|n| node_from_json(&n))
            .collect())
    }

    async fn find_paths(
        &self,
        start_node_id: &str,
        end_node_id: &str,
        max_depth: usize,
        relationship_types: Option<&[String]>,
    ) -> Result<Vec<GraphPath>, InfrastructureError> {
        let types_fragment = Self::rel_type_fragment(relationship_types)?;
        let statement = format!(
            "MATCH p = (a)-[{types_fragment}*..{max_depth}]-(b) \
             WHERE id(a) = $start AND id(b) = $end RETURN p LIMIT {DEFAULT_PATH_LIMIT}"
        );
        let result = self
            .client
            .run(
                &statement,
                json!({
                    "start": parse_graph_id(SERVICE, start_node_id)?,
                    "end": parse_graph_id(SERVICE, end_node_id)?,
                }),
                true,
            )
            .await?;
        Ok(result
            .graphs
            .iter()
            .map(|g| GraphPath {
                nodes: g["nodes"]
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(node_from_json)
                    .collect(),
                relationships: g["relationships"]
                    .as_array()
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(relationship_from_json)
                    .collect(),
            })
            .filter(|p| !p.nodes.is_empty())
            .collect())
    }

    async fn get_neighbors(
        &self,
        node_id: &str,
        relationship_types: Option<&[String]>,
        direction: Direction,
    ) -> Result<Vec<GraphNode>, InfrastructureError> {
        let types_fragment = Self::rel_type_fragment(relationship_types)?;
        let pattern = match direction {
            Direction::Outgoing => format!("(n)-[{types_fragment}]->(m)"),
            Direction::Incoming => format!("(n)<-[{types_fragment}]-(m)"),
            Direction::Both => format!("(n)-[{types_fragment}]-(m)"),
        };
        let statement = format!("MATCH {pattern} WHERE id(n) = $id RETURN DISTINCT m");
        let result = self
            .client
            .run(&statement, json!({"id": parse_graph_id(SERVICE, node_id)?}), true)
            .await?;
        let node_id = parse_graph_id(SERVICE, node_id)?.to_string();
        Ok(result
            .graphs
            .iter()
            .flat_map(|g| g["nodes"].as_array().cloned().unwrap_or_default())
            .filter_map(|n| node_from_json(&n))
            // The graph section includes the matched center node too.
            .filter(|n| n.id != node_id)
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}

fn deleted_count(rows: &[Vec<Value>]) -> i64 {
    rows.first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
