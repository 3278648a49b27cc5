//! Cloudlift service entry point.
//!
//! Loads layered configuration, builds the dependency container, verifies
//! adapter health, then waits for ctrl-c and shuts the container down.

use anyhow::Context;
use tracing::{info, warn};

use cloudlift_app::DependencyContainer;
use cloudlift_config::ConfigLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cloudlift_observability::init();

    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let loader = ConfigLoader::from_env(&config_dir);
    info!(
        dir = %config_dir,
        environment = loader.environment(),
        "loading configuration"
    );
    let config = loader.load().context("configuration failed to load")?;

    let container = DependencyContainer::new(config);
    container
        .ensure_schema()
        .await
        .context("schema setup failed")?;
    // Mediator construction registers every handler; fail fast if wiring is broken.
    container.get_mediator().context("mediator wiring failed")?;

    for (adapter, healthy) in container.health_report().await {
        if healthy {
            info!(adapter, "healthy");
        } else {
            warn!(adapter, "unhealthy at startup");
        }
    }

    info!("cloudlift server running; ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    container.shutdown().await.context("shutdown failed")?;
    Ok(())
}
