//! Config file loading, merging and dotted-path access.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use cloudlift_core::ConfigurationError;

use crate::substitute::substitute_value;

/// Environment variable selecting the override layer.
pub const ENVIRONMENT_VAR: &str = "CONFIG_ENV";

/// Environment used when `CONFIG_ENV` is unset.
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Loads `config.base.json` + `config.{environment}.json` from a directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
    environment: String,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            environment: environment.into(),
        }
    }

    /// Loader for the environment named by `CONFIG_ENV` (default `local`).
    pub fn from_env(dir: impl Into<PathBuf>) -> Self {
        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());
        Self::new(dir, environment)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Load, merge and substitute. Both files are required.
    pub fn load(&self) -> Result<AppConfig, ConfigurationError> {
        let mut merged = load_json_file(&self.dir.join("config.base.json"))?;
        let overlay = load_json_file(&self.dir.join(format!("config.{}.json", self.environment)))?;
        deep_merge(&mut merged, overlay);
        substitute_value(&mut merged)?;
        debug!(environment = %self.environment, "configuration loaded");
        Ok(AppConfig {
            environment: self.environment.clone(),
            root: merged,
        })
    }
}

fn load_json_file(path: &Path) -> Result<Value, ConfigurationError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigurationError::new(format!("cannot read config file: {e}"))
            .with("path", path.display().to_string())
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| {
        ConfigurationError::new(format!("malformed config file: {e}"))
            .with("path", path.display().to_string())
    })?;
    if !value.is_object() {
        return Err(ConfigurationError::new("config file root must be a JSON object")
            .with("path", path.display().to_string()));
    }
    Ok(value)
}

/// Merge `overlay` into `base`.
///
/// Objects merge key-by-key recursively; any non-object overlay value
/// (including arrays) replaces the base value wholesale. A partial
/// `{"adapters": {"graph_db": {...}}}` override therefore leaves the other
/// `adapters.*` keys from the base intact.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merged, substituted configuration with dotted-path access.
#[derive(Debug, Clone)]
pub struct AppConfig {
    environment: String,
    root: Value,
}

impl AppConfig {
    /// Build directly from a JSON value (tests, embedded config).
    pub fn from_value(environment: impl Into<String>, root: Value) -> Self {
        Self {
            environment: environment.into(),
            root,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Dotted-path lookup (`"a.b.c"`). Returns `None` on any missing
    /// segment; never errors.
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in key_path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key_path: &str) -> Option<&str> {
        self.get(key_path)?.as_str()
    }

    pub fn get_str_or(&self, key_path: &str, default: &str) -> String {
        self.get_str(key_path).unwrap_or(default).to_string()
    }

    pub fn get_u64_or(&self, key_path: &str, default: u64) -> u64 {
        self.get(key_path).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key_path: &str, default: bool) -> bool {
        self.get(key_path).and_then(Value::as_bool).unwrap_or(default)
    }

    /// The object at `key_path`, if present and an object.
    pub fn section(&self, key_path: &str) -> Option<&Map<String, Value>> {
        self.get(key_path)?.as_object()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_overrides_leaves_and_keeps_siblings() {
        let mut base = json!({"a": {"x": 1, "y": 2}});
        deep_merge(&mut base, json!({"a": {"x": 9}}));
        assert_eq!(base, json!({"a": {"x": 9, "y": 2}}));
    }

    #[test]
    fn deep_merge_replaces_non_object_values_wholesale() {
        let mut base = json!({"hosts": ["a", "b"], "nested": {"k": 1}});
        deep_merge(&mut base, json!({"hosts": ["c"], "nested": "flat"}));
        assert_eq!(base, json!({"hosts": ["c"], "nested": "flat"}));
    }

    #[test]
    fn partial_adapter_override_keeps_other_adapters() {
        let mut base = json!({
            "adapters": {
                "graph_db": {"type": "Neo4jAdapter", "host": "localhost"},
                "object_storage": {"type": "MinioAdapter"}
            }
        });
        deep_merge(&mut base, json!({"adapters": {"graph_db": {"host": "neo4j.prod"}}}));
        assert_eq!(base["adapters"]["graph_db"]["host"], "neo4j.prod");
        assert_eq!(base["adapters"]["graph_db"]["type"], "Neo4jAdapter");
        assert_eq!(base["adapters"]["object_storage"]["type"], "MinioAdapter");
    }

    #[test]
    fn dotted_get_returns_none_on_missing_segment() {
        let cfg = AppConfig::from_value("test", json!({"a": {"b": 1}}));
        assert_eq!(cfg.get("a.b").and_then(Value::as_u64), Some(1));
        assert!(cfg.get("a.b.c").is_none());
        assert!(cfg.get("nope").is_none());
        assert_eq!(cfg.get_u64_or("a.missing", 7), 7);
    }

    #[test]
    fn loader_layers_environment_over_base() {
        let dir = std::env::temp_dir().join(format!("cloudlift-config-{}", uuid_like()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.base.json"),
            r#"{"adapters": {"relational_db": {"type": "PostgresAdapter", "port": 5432}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("config.test.json"),
            r#"{"adapters": {"relational_db": {"host": "${CLOUDLIFT_CFG_TEST_HOST:db.test}"}}}"#,
        )
        .unwrap();

        let cfg = ConfigLoader::new(&dir, "test").load().unwrap();
        assert_eq!(cfg.get_str("adapters.relational_db.type"), Some("PostgresAdapter"));
        assert_eq!(cfg.get_str("adapters.relational_db.host"), Some("db.test"));
        assert_eq!(cfg.get_u64_or("adapters.relational_db.port", 0), 5432);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_base_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("cloudlift-config-{}", uuid_like()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(ConfigLoader::new(&dir, "test").load().is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = std::env::temp_dir().join(format!("cloudlift-config-{}", uuid_like()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.base.json"), "{not json").unwrap();
        std::fs::write(dir.join("config.test.json"), "{}").unwrap();
        assert!(ConfigLoader::new(&dir, "test").load().is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        format!("{nanos}-{:?}", std::thread::current().id())
    }

    mod merge_properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| Value::from(n)),
                "[a-z]{0,8}".prop_map(Value::String),
            ];
            leaf.prop_recursive(depth, 64, 8, |inner| {
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..6).prop_map(|m| {
                    Value::Object(m.into_iter().collect())
                })
            })
        }

        proptest! {
            // Every key present in the overlay ends up with the merged value
            // of the overlay at that key; keys only in base survive.
            #[test]
            fn overlay_keys_win(base in arb_json(3), overlay in arb_json(3)) {
                let mut merged = base.clone();
                deep_merge(&mut merged, overlay.clone());
                match (&base, &overlay, &merged) {
                    (Value::Object(b), Value::Object(o), Value::Object(m)) => {
                        for key in b.keys() {
                            prop_assert!(m.contains_key(key));
                        }
                        for (key, ov) in o {
                            if !ov.is_object() || !b.get(key).map(Value::is_object).unwrap_or(false) {
                                prop_assert_eq!(m.get(key), Some(ov));
                            }
                        }
                    }
                    (_, o, m) if !o.is_object() || !base.is_object() => prop_assert_eq!(m, o),
                    _ => {}
                }
            }

            // Merging with itself is the identity.
            #[test]
            fn merge_is_idempotent(v in arb_json(3)) {
                let mut merged = v.clone();
                deep_merge(&mut merged, v.clone());
                prop_assert_eq!(merged, v);
            }
        }
    }
}
