use std::path::PathBuf;

use tracing::{error, info};

use crate::{
    config::{config_path, create_default_config, init_config},
    registry::ControllerRegistry,
    setup::setup_all,
};

pub mod command_executor;
pub mod config;
pub mod controllers;
pub mod logging;
pub mod registry;
pub mod setup;

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (_config_source, config) = init_config().map_err(|e| {
        error!(path = %config_path().display(), error = %e, "failed to load configuration");
        error!("run with CREATE_CONFIG=1 to create a default configuration file");
        e
    })?;

    let mut registry = ControllerRegistry::new();
    let started = setup_all(&mut registry, &config).await;
    info!(
        started,
        configured = config.controllers.len(),
        "NV40 controllers started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    registry.shutdown_all().await;
    Ok(())
}
