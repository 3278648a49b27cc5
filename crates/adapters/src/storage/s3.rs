//! AWS S3 adapter.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;

use cloudlift_core::InfrastructureError;

use crate::config_map::AdapterConfig;

use super::delegate_object_storage;
use super::store::{StoreCore, build_error};

const SERVICE: &str = "s3";

#[derive(Debug)]
pub struct S3Adapter {
    core: StoreCore,
}

impl S3Adapter {
    /// Credentials come from the standard AWS environment (env vars,
    /// instance profile) unless `access_key`/`secret_key` are set in config.
    /// Defaults: bucket `cloudlift`, region `us-east-1`.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let bucket = cfg.str_or("bucket", "cloudlift");
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_region(cfg.str_or("region", "us-east-1"));
        if let Some(endpoint) = cfg.opt_str("endpoint") {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key) = cfg.opt_str("access_key") {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = cfg.opt_str("secret_key") {
            builder = builder.with_secret_access_key(secret_key);
        }
        let store = builder.build().map_err(|e| build_error(SERVICE, e))?;
        let store = Arc::new(store);
        Ok(Self {
            core: StoreCore::new(SERVICE, bucket, store.clone(), store),
        })
    }
}

delegate_object_storage!(S3Adapter);
