//! `cloudlift-adapters` — concrete backends for every capability interface.
//!
//! Each adapter:
//! - is constructible from a partial (or empty) JSON config map, with
//!   local-development defaults for every key;
//! - owns its backend client and connects lazily on first use;
//! - applies its own timeouts from config;
//! - wraps every backend-native failure into the matching
//!   `InfrastructureError` variant, with service/operation context.
//!
//! Adapter selection happens in [`registry`]: a static map from the config
//! `type` string to a factory, validated exhaustively (unknown type fails
//! fast, no silent default).

pub mod bus;
pub mod config_map;
pub mod graph;
pub mod registry;
pub mod relational;
pub mod secrets;
pub mod sign;
pub mod storage;
pub mod vector;

pub use config_map::AdapterConfig;
pub use registry::{
    build_graph_db, build_message_bus, build_object_storage, build_relational_db,
    build_secrets_manager, build_vector_db, known_adapter_types,
};
