//! Graph database adapters.

mod aura;
mod cypher;
mod neo4j;

pub use aura::Neo4jAuraAdapter;
pub use neo4j::Neo4jAdapter;
