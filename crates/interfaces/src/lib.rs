//! `cloudlift-interfaces` — capability contracts for pluggable infrastructure.
//!
//! Each module defines one abstract contract (a trait plus its data types)
//! that any backend adapter can satisfy. The rules, for every trait here:
//!
//! - all operations are async and may suspend at I/O boundaries;
//! - no backend-native type (client handles, driver errors, wire structs)
//!   crosses the boundary in either direction;
//! - failures are `cloudlift_core::InfrastructureError` variants;
//! - `health_check()` never fails, it reports reachability as a bool;
//! - ordering across concurrent calls is whatever the backing store
//!   guarantees. Nothing more. Each adapter documents its own semantics.
//!
//! Implementations live in `cloudlift-adapters`; callers obtain instances
//! through the `DependencyContainer` in `cloudlift-app`.

pub mod graph;
pub mod message_bus;
pub mod object_storage;
pub mod relational;
pub mod secrets;
pub mod vector;

pub use graph::{Direction, GraphDb, GraphNode, GraphPath, GraphRelationship};
pub use message_bus::{
    Message, MessageBus, MessageHandler, MessagePriority, QueueConfig, QueueStats,
};
pub use object_storage::{ByteStream, ObjectMetadata, ObjectStorage, PresignMethod};
pub use relational::{ColumnDef, ColumnInfo, RelationalDb, RelationalTransaction, Row, SqlParams};
pub use secrets::{SecretMetadata, SecretVersion, SecretsManager};
pub use vector::{DistanceMetric, SearchResult, VectorDb, VectorDocument};
