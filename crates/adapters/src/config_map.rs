//! Typed access to an adapter's JSON config section.
//!
//! Every adapter constructor takes one of these; every getter has a default
//! so an empty map yields a working local-development configuration.

use serde_json::{Map, Value};

/// One adapter's slice of the merged configuration.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig(Map<String, Value>);

impl AdapterConfig {
    pub fn new(section: Map<String, Value>) -> Self {
        Self(section)
    }

    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn opt_str(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(Value::as_str).map(str::to_string)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.0.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.u64_or(key, u64::from(default)) as u32
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// The `type` field selecting the adapter implementation.
    pub fn adapter_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for AdapterConfig {
    fn from(section: Map<String, Value>) -> Self {
        Self(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_on_empty_map() {
        let cfg = AdapterConfig::empty();
        assert_eq!(cfg.str_or("host", "localhost"), "localhost");
        assert_eq!(cfg.u64_or("port", 5432), 5432);
        assert!(cfg.adapter_type().is_none());
    }

    #[test]
    fn values_override_defaults() {
        let section = json!({"type": "PostgresAdapter", "port": 5433})
            .as_object()
            .cloned()
            .unwrap();
        let cfg = AdapterConfig::new(section);
        assert_eq!(cfg.adapter_type(), Some("PostgresAdapter"));
        assert_eq!(cfg.u64_or("port", 5432), 5433);
    }
}
