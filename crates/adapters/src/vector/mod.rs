//! Vector database adapters.

mod cloud;
mod weaviate;

pub use cloud::WeaviateCloudAdapter;
pub use weaviate::WeaviateAdapter;
