//! Minimal client for Neo4j's transactional Cypher-over-HTTP endpoint.
//!
//! One auto-commit request per call (`POST /db/{database}/tx/commit`). Rows
//! come back in the `row` result format; node/relationship projections use
//! the `graph` format, which carries ids, labels and properties.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::{Value, json};

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{GraphNode, GraphRelationship};

#[derive(Debug)]
pub(crate) struct CypherClient {
    http: reqwest::Client,
    commit_url: String,
    username: String,
    password: String,
    service: &'static str,
}

/// One statement's results.
#[derive(Debug, Default)]
pub(crate) struct CypherResult {
    pub columns: Vec<String>,
    /// `row` payload per data entry.
    pub rows: Vec<Vec<Value>>,
    /// `graph` payload per data entry (nodes/relationships).
    pub graphs: Vec<Value>,
}

impl CypherClient {
    pub fn new(
        endpoint: &str,
        database: &str,
        username: String,
        password: String,
        timeout: Duration,
        service: &'static str,
    ) -> Result<Self, InfrastructureError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| wrap(service, "client", e.to_string(), Some(Box::new(e))))?;
        Ok(Self {
            http,
            commit_url: format!("{}/db/{database}/tx/commit", endpoint.trim_end_matches('/')),
            username,
            password,
            service,
        })
    }

    pub async fn run(
        &self,
        statement: &str,
        parameters: Value,
        include_graph: bool,
    ) -> Result<CypherResult, InfrastructureError> {
        let contents = if include_graph {
            json!(["row", "graph"])
        } else {
            json!(["row"])
        };
        let body = json!({
            "statements": [{
                "statement": statement,
                "parameters": parameters,
                "resultDataContents": contents,
            }]
        });

        let response = self
            .http
            .post(&self.commit_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| wrap(self.service, "execute_query", e.to_string(), Some(Box::new(e))))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| wrap(self.service, "execute_query", e.to_string(), Some(Box::new(e))))?;

        if let Some(err) = payload["errors"].as_array().and_then(|a| a.first()) {
            let code = err["code"].as_str().unwrap_or("unknown");
            let message = err["message"].as_str().unwrap_or("unknown error");
            return Err(wrap(
                self.service,
                "execute_query",
                format!("{code}: {message}"),
                None,
            ));
        }
        if !status.is_success() {
            return Err(wrap(
                self.service,
                "execute_query",
                format!("http status {status}"),
                None,
            ));
        }

        let mut out = CypherResult::default();
        if let Some(result) = payload["results"].as_array().and_then(|a| a.first()) {
            out.columns = result["columns"]
                .as_array()
                .map(|cols| {
                    cols.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            for entry in result["data"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
                out.rows.push(entry["row"].as_array().cloned().unwrap_or_default());
                out.graphs.push(entry["graph"].clone());
            }
        }
        Ok(out)
    }

    pub async fn health_check(&self) -> bool {
        self.run("RETURN 1", json!({}), false).await.is_ok()
    }
}

/// First node in a result's graph sections.
pub(crate) fn first_node(result: &CypherResult) -> Option<GraphNode> {
    result
        .graphs
        .iter()
        .flat_map(|g| g["nodes"].as_array().cloned().unwrap_or_default())
        .next()
        .and_then(|n| node_from_json(&n))
}

/// First relationship in a result's graph sections.
pub(crate) fn first_relationship(result: &CypherResult) -> Option<GraphRelationship> {
    result
        .graphs
        .iter()
        .flat_map(|g| g["relationships"].as_array().cloned().unwrap_or_default())
        .next()
        .and_then(|r| relationship_from_json(&r))
}

pub(crate) fn node_from_json(value: &Value) -> Option<GraphNode> {
    Some(GraphNode {
        id: value["id"].as_str()?.to_string(),
        labels: value["labels"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default(),
        properties: value["properties"].as_object().cloned().unwrap_or_default(),
    })
}

pub(crate) fn relationship_from_json(value: &Value) -> Option<GraphRelationship> {
    Some(GraphRelationship {
        id: value["id"].as_str()?.to_string(),
        rel_type: value["type"].as_str()?.to_string(),
        start_node_id: value["startNode"].as_str()?.to_string(),
        end_node_id: value["endNode"].as_str()?.to_string(),
        properties: value["properties"].as_object().cloned().unwrap_or_default(),
    })
}

/// Graph element ids travel as opaque strings; the HTTP endpoint uses
/// integers underneath.
pub(crate) fn parse_graph_id(service: &'static str, id: &str) -> Result<i64, InfrastructureError> {
    id.parse::<i64>()
        .map_err(|_| wrap(service, "parse_id", format!("invalid graph id '{id}'"), None))
}

/// Validate a label, relationship type or property key before it is spliced
/// into a Cypher pattern (parameters cannot stand in for these).
pub(crate) fn ident_ok(service: &'static str, ident: &str) -> Result<(), InfrastructureError> {
    if ident.is_empty()
        || !ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(wrap(
            service,
            "identifier",
            format!("invalid graph identifier '{ident}'"),
            None,
        ));
    }
    Ok(())
}

pub(crate) fn wrap(
    service: &'static str,
    operation: &str,
    message: String,
    source: Option<cloudlift_core::BoxError>,
) -> InfrastructureError {
    InfrastructureError::Database {
        database_type: service.to_string(),
        operation: operation.to_string(),
        message,
        query: None,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_projection() {
        let node = node_from_json(&json!({
            "id": "42",
            "labels": ["Server", "Linux"],
            "properties": {"hostname": "web-1"}
        }))
        .unwrap();
        assert_eq!(node.id, "42");
        assert!(node.labels.contains("Server"));
        assert_eq!(node.properties["hostname"], "web-1");
    }

    #[test]
    fn relationship_projection() {
        let rel = relationship_from_json(&json!({
            "id": "7", "type": "DEPENDS_ON", "startNode": "1", "endNode": "2",
            "properties": {}
        }))
        .unwrap();
        assert_eq!(rel.rel_type, "DEPENDS_ON");
        assert_eq!(rel.start_node_id, "1");
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(ident_ok("neo4j", "DEPENDS_ON").is_ok());
        assert!(ident_ok("neo4j", "bad`label").is_err());
        assert!(ident_ok("neo4j", "").is_err());
    }

    #[test]
    fn parses_graph_ids() {
        assert_eq!(parse_graph_id("neo4j", "42").unwrap(), 42);
        assert!(parse_graph_id("neo4j", "4:abc:0").is_err());
    }
}
