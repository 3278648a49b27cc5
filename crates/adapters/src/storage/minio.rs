//! MinIO adapter (local S3-compatible storage).

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;

use cloudlift_core::InfrastructureError;

use crate::config_map::AdapterConfig;

use super::delegate_object_storage;
use super::store::{StoreCore, build_error};

const SERVICE: &str = "minio";

#[derive(Debug)]
pub struct MinioAdapter {
    core: StoreCore,
}

impl MinioAdapter {
    /// Defaults: `http://localhost:9000`, bucket `cloudlift`, credentials
    /// `minioadmin`/`minioadmin`. Path-style addressing, plain HTTP allowed.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let bucket = cfg.str_or("bucket", "cloudlift");
        let endpoint = cfg.str_or(
            "endpoint",
            &format!(
                "http://{}:{}",
                cfg.str_or("host", "localhost"),
                cfg.u64_or("port", 9000)
            ),
        );
        let store = AmazonS3Builder::new()
            .with_endpoint(endpoint)
            .with_bucket_name(&bucket)
            .with_region(cfg.str_or("region", "us-east-1"))
            .with_access_key_id(cfg.str_or("access_key", "minioadmin"))
            .with_secret_access_key(cfg.str_or("secret_key", "minioadmin"))
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false)
            .build()
            .map_err(|e| build_error(SERVICE, e))?;
        let store = Arc::new(store);
        Ok(Self {
            core: StoreCore::new(SERVICE, bucket, store.clone(), store),
        })
    }
}

delegate_object_storage!(MinioAdapter);
