//! Weaviate adapter (self-hosted / Docker).
//!
//! Talks to the REST API for schema and object CRUD and to the GraphQL
//! endpoint for searches. Weaviate object ids must be UUIDs, so caller ids
//! are mapped to deterministic v5 UUIDs and the original id travels in the
//! `doc_id` property. Full metadata is stored as a JSON string in `meta`;
//! primitive metadata values are additionally flattened into their own
//! properties so `where` filters can reach them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value, json};
use tracing::instrument;
use uuid::Uuid;

use cloudlift_core::InfrastructureError;
use cloudlift_interfaces::{DistanceMetric, SearchResult, VectorDb, VectorDocument};

use crate::config_map::AdapterConfig;

const SERVICE: &str = "weaviate";
/// Property names the adapter owns; metadata keys that collide are only kept
/// inside `meta`.
const RESERVED_PROPS: [&str; 3] = ["doc_id", "content", "meta"];

#[derive(Debug)]
pub struct WeaviateAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeaviateAdapter {
    /// Defaults: `http://localhost:8080`, no API key,
    /// `request_timeout_secs` 30.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let endpoint = cfg.str_or(
            "endpoint",
            &format!(
                "http://{}:{}",
                cfg.str_or("host", "localhost"),
                cfg.u64_or("port", 8080)
            ),
        );
        Self::with_endpoint(cfg, &endpoint)
    }

    pub(crate) fn with_endpoint(
        cfg: &AdapterConfig,
        endpoint: &str,
    ) -> Result<Self, InfrastructureError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.u64_or("request_timeout_secs", 30)))
            .build()
            .map_err(|e| wrap("client", e.to_string(), Some(Box::new(e))))?;
        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_key: cfg.opt_str("api_key"),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        operation: &str,
    ) -> Result<(StatusCode, Value), InfrastructureError> {
        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| wrap(operation, e.to_string(), Some(Box::new(e))))?;
        let status = response.status();
        let payload = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, payload))
    }

    /// Run a GraphQL `Get` query and return the hit objects for `class`.
    async fn graphql_get(
        &self,
        class: &str,
        args: &[String],
        operation: &str,
    ) -> Result<Vec<Value>, InfrastructureError> {
        let query = format!(
            "{{ Get {{ {class}({}) {{ doc_id content meta \
             _additional {{ id distance certainty score vector }} }} }} }}",
            args.join(", ")
        );
        let (status, payload) = self
            .send(Method::POST, "/v1/graphql", Some(&json!({"query": query})), operation)
            .await?;
        if let Some(err) = payload["errors"].as_array().and_then(|a| a.first()) {
            let message = err["message"].as_str().unwrap_or("unknown error");
            return Err(wrap(operation, message.to_string(), None));
        }
        if !status.is_success() {
            return Err(wrap(operation, format!("http status {status}"), None));
        }
        Ok(payload["data"]["Get"][class].as_array().cloned().unwrap_or_default())
    }

    fn object_path(class: &str, id: &str) -> String {
        format!("/v1/objects/{class}/{}", object_uuid(id))
    }
}

#[async_trait]
impl VectorDb for WeaviateAdapter {
    #[instrument(skip(self, metadata_schema), err)]
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance_metric: DistanceMetric,
        metadata_schema: Option<&Map<String, Value>>,
    ) -> Result<(), InfrastructureError> {
        // Weaviate infers the dimension from the first inserted vector.
        let _ = dimension;
        let class = class_name(name)?;
        let mut properties = vec![
            json!({"name": "doc_id", "dataType": ["text"]}),
            json!({"name": "content", "dataType": ["text"]}),
            json!({"name": "meta", "dataType": ["text"]}),
        ];
        if let Some(schema) = metadata_schema {
            for (field, portable_type) in schema {
                prop_ok(field)?;
                let data_type = match portable_type.as_str().unwrap_or("text") {
                    "number" => "number",
                    "boolean" => "boolean",
                    "int" | "integer" => "int",
                    _ => "text",
                };
                properties.push(json!({"name": field, "dataType": [data_type]}));
            }
        }
        let body = json!({
            "class": class,
            "vectorizer": "none",
            "vectorIndexConfig": {"distance": distance_name(distance_metric)},
            "properties": properties,
        });
        let (status, payload) = self
            .send(Method::POST, "/v1/schema", Some(&body), "create_collection")
            .await?;
        if !status.is_success() {
            return Err(wrap("create_collection", error_message(&payload, status), None));
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), InfrastructureError> {
        let class = class_name(name)?;
        let (status, payload) = self
            .send(Method::DELETE, &format!("/v1/schema/{class}"), None, "delete_collection")
            .await?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(wrap("delete_collection", error_message(&payload, status), None));
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, InfrastructureError> {
        let class = class_name(name)?;
        let (status, payload) = self
            .send(Method::GET, &format!("/v1/schema/{class}"), None, "collection_exists")
            .await?;
        match status {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(wrap("collection_exists", error_message(&payload, s), None)),
        }
    }

    #[instrument(skip(self, document), fields(id = %document.id), err)]
    async fn insert_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError> {
        let class = class_name(collection)?;
        let body = json!({
            "class": class,
            "id": object_uuid(&document.id).to_string(),
            "vector": document.vector,
            "properties": object_properties(document),
        });
        let (status, payload) = self
            .send(Method::POST, "/v1/objects", Some(&body), "insert_document")
            .await?;
        if !status.is_success() {
            return Err(wrap("insert_document", error_message(&payload, status), None));
        }
        Ok(())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<VectorDocument>, InfrastructureError> {
        let class = class_name(collection)?;
        let path = format!("{}?include=vector", Self::object_path(&class, id));
        let (status, payload) = self.send(Method::GET, &path, None, "get_document").await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(document_from_object(id, &payload))),
            s => Err(wrap("get_document", error_message(&payload, s), None)),
        }
    }

    async fn update_document(
        &self,
        collection: &str,
        document: &VectorDocument,
    ) -> Result<(), InfrastructureError> {
        let class = class_name(collection)?;
        let body = json!({
            "class": class,
            "id": object_uuid(&document.id).to_string(),
            "vector": document.vector,
            "properties": object_properties(document),
        });
        let (status, payload) = self
            .send(
                Method::PUT,
                &Self::object_path(&class, &document.id),
                Some(&body),
                "update_document",
            )
            .await?;
        if !status.is_success() {
            return Err(wrap("update_document", error_message(&payload, status), None));
        }
        Ok(())
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<(), InfrastructureError> {
        let class = class_name(collection)?;
        let (status, payload) = self
            .send(Method::DELETE, &Self::object_path(&class, id), None, "delete_document")
            .await?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(wrap("delete_document", error_message(&payload, status), None));
        }
        Ok(())
    }

    #[instrument(skip(self, vector, metadata_filter), err)]
    async fn search_similar(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError> {
        let class = class_name(collection)?;
        let mut args = vec![
            format!("limit: {limit}"),
            format!("nearVector: {{vector: {}}}", vector_literal(vector)),
        ];
        if let Some(fragment) = where_fragment(metadata_filter)? {
            args.push(fragment);
        }
        let hits = self.graphql_get(&class, &args, "search_similar").await?;
        Ok(filter_hits(&hits, min_score))
    }

    #[instrument(skip(self, metadata_filter), err)]
    async fn search_by_text(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
        min_score: Option<f32>,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<SearchResult>, InfrastructureError> {
        let class = class_name(collection)?;
        // Requires a vectorizer module on the class; without one the server
        // reports an error which is surfaced as-is.
        let mut args = vec![
            format!("limit: {limit}"),
            format!("nearText: {{concepts: [{}]}}", gql_string(text)),
        ];
        if let Some(fragment) = where_fragment(metadata_filter)? {
            args.push(fragment);
        }
        let hits = self.graphql_get(&class, &args, "search_by_text").await?;
        Ok(filter_hits(&hits, min_score))
    }

    #[instrument(skip(self, vector, metadata_filter), err)]
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
        let class = class_name(collection)?;
        let alpha = hybrid_alpha(text_weight, vector_weight).ok_or_else(|| {
            wrap(
                "hybrid_search",
                format!("invalid weights text={text_weight} vector={vector_weight}"),
                None,
            )
        })?;
        let mut hybrid = format!("query: {}, alpha: {alpha}", gql_string(text));
        if let Some(vector) = vector {
            hybrid.push_str(&format!(", vector: {}", vector_literal(vector)));
        }
        let mut args = vec![format!("limit: {limit}"), format!("hybrid: {{{hybrid}}}")];
        if let Some(fragment) = where_fragment(metadata_filter)? {
            args.push(fragment);
        }
        let hits = self.graphql_get(&class, &args, "hybrid_search").await?;
        Ok(filter_hits(&hits, None))
    }

    async fn health_check(&self) -> bool {
        matches!(
            self.send(Method::GET, "/v1/.well-known/ready", None, "health_check").await,
            Ok((status, _)) if status.is_success()
        )
    }
}

/// Collection name -> Weaviate class name (must start with an uppercase
/// letter).
fn class_name(name: &str) -> Result<String, InfrastructureError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(wrap("collection", format!("invalid collection name '{name}'"), None));
    }
    let mut chars = name.chars();
    let first = chars.next().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
    Ok(format!("{first}{}", chars.as_str()))
}

fn prop_ok(name: &str) -> Result<(), InfrastructureError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid || RESERVED_PROPS.contains(&name) {
        return Err(wrap("schema", format!("invalid metadata field '{name}'"), None));
    }
    Ok(())
}

/// Deterministic object id for a caller-supplied document id.
fn object_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
}

fn distance_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "cosine",
        DistanceMetric::Dot => "dot",
        DistanceMetric::L2 => "l2-squared",
    }
}

fn object_properties(document: &VectorDocument) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("doc_id".into(), json!(document.id));
    props.insert("content".into(), json!(document.content));
    props.insert(
        "meta".into(),
        Value::String(Value::Object(document.metadata.clone()).to_string()),
    );
    for (key, value) in &document.metadata {
        let primitive = matches!(value, Value::String(_) | Value::Bool(_) | Value::Number(_));
        if primitive && prop_ok(key).is_ok() {
            props.insert(key.clone(), value.clone());
        }
    }
    props
}

fn document_from_object(id: &str, payload: &Value) -> VectorDocument {
    let properties = payload["properties"].as_object().cloned().unwrap_or_default();
    VectorDocument {
        id: properties
            .get("doc_id")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string(),
        content: properties
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        vector: float_vec(&payload["vector"]),
        metadata: properties
            .get("meta")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
    }
}

fn float_vec(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|v| v.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
        .unwrap_or_default()
}

fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|f| format!("{f}")).collect();
    format!("[{}]", parts.join(", "))
}

fn gql_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// `where:` argument for a map of metadata equalities; `None` when the
/// filter is absent or empty.
fn where_fragment(
    filter: Option<&Map<String, Value>>,
) -> Result<Option<String>, InfrastructureError> {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return Ok(None);
    };
    let mut operands = Vec::new();
    for (key, value) in filter {
        prop_ok(key)?;
        let clause = match value {
            Value::String(s) => format!("valueText: {}", gql_string(s)),
            Value::Bool(b) => format!("valueBoolean: {b}"),
            Value::Number(n) if n.is_i64() => format!("valueInt: {n}"),
            Value::Number(n) => format!("valueNumber: {n}"),
            other => {
                return Err(wrap(
                    "search",
                    format!("unsupported filter value for '{key}': {other}"),
                    None,
                ));
            }
        };
        operands.push(format!("{{path: [\"{key}\"], operator: Equal, {clause}}}"));
    }
    let fragment = if operands.len() == 1 {
        format!("where: {}", operands[0])
    } else {
        format!("where: {{operator: And, operands: [{}]}}", operands.join(", "))
    };
    Ok(Some(fragment))
}

/// Weaviate's `alpha`: 0 is pure keyword, 1 is pure vector.
fn hybrid_alpha(text_weight: f32, vector_weight: f32) -> Option<f32> {
    let sum = text_weight + vector_weight;
    if text_weight < 0.0 || vector_weight < 0.0 || sum <= 0.0 || !sum.is_finite() {
        return None;
    }
    Some(vector_weight / sum)
}

fn filter_hits(hits: &[Value], min_score: Option<f32>) -> Vec<SearchResult> {
    hits.iter()
        .map(hit_from_graphql)
        .filter(|hit| min_score.is_none_or(|min| hit.score >= min))
        .collect()
}

fn hit_from_graphql(obj: &Value) -> SearchResult {
    let additional = &obj["_additional"];
    let distance = additional["distance"].as_f64().map(|d| d as f32);
    SearchResult {
        document: VectorDocument {
            id: obj["doc_id"].as_str().unwrap_or_default().to_string(),
            content: obj["content"].as_str().unwrap_or_default().to_string(),
            vector: float_vec(&additional["vector"]),
            metadata: obj["meta"]
                .as_str()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default(),
        },
        score: score_of(additional),
        distance,
    }
}

/// Normalized "higher is better" score. Hybrid queries report `score` (as a
/// string), vector queries report `certainty` or only `distance`.
fn score_of(additional: &Value) -> f32 {
    if let Some(score) = additional["score"].as_str().and_then(|s| s.parse::<f32>().ok()) {
        return score;
    }
    if let Some(score) = additional["score"].as_f64() {
        return score as f32;
    }
    if let Some(certainty) = additional["certainty"].as_f64() {
        return certainty as f32;
    }
    if let Some(distance) = additional["distance"].as_f64() {
        return (1.0 - distance) as f32;
    }
    0.0
}

fn wrap(
    operation: &str,
    message: String,
    source: Option<cloudlift_core::BoxError>,
) -> InfrastructureError {
    InfrastructureError::Database {
        database_type: SERVICE.to_string(),
        operation: operation.to_string(),
        message,
        query: None,
        source,
    }
}

fn error_message(payload: &Value, status: StatusCode) -> String {
    payload["error"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|e| e["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("http status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_are_capitalized() {
        assert_eq!(class_name("assessment_docs").unwrap(), "Assessment_docs");
        assert_eq!(class_name("Documents").unwrap(), "Documents");
        assert!(class_name("9docs").is_err());
        assert!(class_name("bad-name").is_err());
        assert!(class_name("").is_err());
    }

    #[test]
    fn object_uuids_are_deterministic() {
        assert_eq!(object_uuid("report-1"), object_uuid("report-1"));
        assert_ne!(object_uuid("report-1"), object_uuid("report-2"));
    }

    #[test]
    fn where_fragment_single_equality() {
        let mut filter = Map::new();
        filter.insert("project_id".into(), json!("p-1"));
        let fragment = where_fragment(Some(&filter)).unwrap().unwrap();
        assert_eq!(
            fragment,
            "where: {path: [\"project_id\"], operator: Equal, valueText: \"p-1\"}"
        );
    }

    #[test]
    fn where_fragment_combines_with_and() {
        let mut filter = Map::new();
        filter.insert("approved".into(), json!(true));
        filter.insert("pages".into(), json!(12));
        let fragment = where_fragment(Some(&filter)).unwrap().unwrap();
        assert!(fragment.starts_with("where: {operator: And, operands: ["));
        assert!(fragment.contains("valueBoolean: true"));
        assert!(fragment.contains("valueInt: 12"));
    }

    #[test]
    fn where_fragment_rejects_bad_keys_and_values() {
        let mut filter = Map::new();
        filter.insert("bad key".into(), json!("x"));
        assert!(where_fragment(Some(&filter)).is_err());

        let mut filter = Map::new();
        filter.insert("tags".into(), json!(["a", "b"]));
        assert!(where_fragment(Some(&filter)).is_err());

        assert!(where_fragment(None).unwrap().is_none());
        assert!(where_fragment(Some(&Map::new())).unwrap().is_none());
    }

    #[test]
    fn alpha_normalizes_weights() {
        assert_eq!(hybrid_alpha(1.0, 1.0), Some(0.5));
        assert_eq!(hybrid_alpha(3.0, 1.0), Some(0.25));
        assert_eq!(hybrid_alpha(0.0, 2.0), Some(1.0));
        assert_eq!(hybrid_alpha(0.0, 0.0), None);
        assert_eq!(hybrid_alpha(-1.0, 2.0), None);
    }

    #[test]
    fn hit_parsing_prefers_hybrid_score() {
        let hit = hit_from_graphql(&json!({
            "doc_id": "report-1",
            "content": "lift and shift",
            "meta": "{\"project_id\":\"p-1\"}",
            "_additional": {"score": "0.87", "distance": 0.4}
        }));
        assert_eq!(hit.document.id, "report-1");
        assert_eq!(hit.document.metadata["project_id"], "p-1");
        assert!((hit.score - 0.87).abs() < 1e-6);
        assert_eq!(hit.distance, Some(0.4));
    }

    #[test]
    fn hit_parsing_falls_back_to_distance() {
        let hit = hit_from_graphql(&json!({
            "doc_id": "report-2",
            "content": "",
            "_additional": {"distance": 0.25}
        }));
        assert!((hit.score - 0.75).abs() < 1e-6);
        assert!(hit.document.metadata.is_empty());
    }

    #[test]
    fn min_score_drops_weak_hits() {
        let hits = vec![
            json!({"doc_id": "a", "content": "", "_additional": {"certainty": 0.9}}),
            json!({"doc_id": "b", "content": "", "_additional": {"certainty": 0.3}}),
        ];
        let kept = filter_hits(&hits, Some(0.5));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].document.id, "a");
    }

    #[test]
    fn flattened_properties_skip_reserved_and_complex_keys() {
        let mut metadata = Map::new();
        metadata.insert("project_id".into(), json!("p-1"));
        metadata.insert("content".into(), json!("clobber"));
        metadata.insert("nested".into(), json!({"a": 1}));
        let doc = VectorDocument {
            id: "d-1".into(),
            content: "body".into(),
            vector: vec![0.1],
            metadata,
        };
        let props = object_properties(&doc);
        assert_eq!(props["doc_id"], "d-1");
        assert_eq!(props["content"], "body");
        assert_eq!(props["project_id"], "p-1");
        assert!(!props.contains_key("nested"));
        let meta: Map<String, Value> =
            serde_json::from_str(props["meta"].as_str().unwrap()).unwrap();
        assert_eq!(meta["content"], "clobber");
    }
}
