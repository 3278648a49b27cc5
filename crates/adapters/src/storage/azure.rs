//! Azure Blob Storage adapter.

use std::sync::Arc;

use object_store::azure::MicrosoftAzureBuilder;

use cloudlift_core::InfrastructureError;

use crate::config_map::AdapterConfig;

use super::delegate_object_storage;
use super::store::{StoreCore, build_error};

const SERVICE: &str = "azure_blob";

#[derive(Debug)]
pub struct AzureBlobAdapter {
    core: StoreCore,
}

impl AzureBlobAdapter {
    /// Credentials come from the standard Azure environment unless
    /// `account`/`access_key` are set in config. Defaults: container
    /// `cloudlift`; `use_emulator` selects Azurite.
    pub fn from_config(cfg: &AdapterConfig) -> Result<Self, InfrastructureError> {
        let container = cfg.str_or("container", "cloudlift");
        let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(&container);
        if let Some(account) = cfg.opt_str("account") {
            builder = builder.with_account(account);
        }
        if let Some(access_key) = cfg.opt_str("access_key") {
            builder = builder.with_access_key(access_key);
        }
        if cfg.bool_or("use_emulator", false) {
            builder = builder.with_use_emulator(true).with_allow_http(true);
        }
        let store = builder.build().map_err(|e| build_error(SERVICE, e))?;
        let store = Arc::new(store);
        Ok(Self {
            core: StoreCore::new(SERVICE, container, store.clone(), store),
        })
    }
}

delegate_object_storage!(AzureBlobAdapter);
