// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use clap::Parser;
use color_eyre::eyre::{self, Context};
use dommer_common::config::AppConfig;
use dommer_common::runtime::{create_shutdown_cancellation_token, AppRuntime};
use dommer_common::stores::memory::MemoryStores;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

mod args;

async fn read_app_config<P: AsRef<Path>>(path: P) -> eyre::Result<AppConfig> {
    let content = tokio::fs::read_to_string(path).await?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();
    let args = args::Args::try_parse()?;

    let app_config = read_app_config(&args.config_file)
        .await
        .context("unable to read the competition configuration")?;

    info!("seeding stores");
    let stores =
        MemoryStores::from_config(&app_config).context("invalid competition configuration")?;

    let runtime = AppRuntime {
        config: Arc::new(app_config),
        stores: stores.handles(),
        cancellation_token: create_shutdown_cancellation_token(),
    };

    info!("starting components");
    let mut set = JoinSet::new();

    if args.components.enable_engine {
        set.spawn(dommer_engine::main(runtime.clone(), args.engine));
    }

    if set.is_empty() {
        warn!("no components enabled, see --help for a list of components");
    }

    while let Some(res) = set.join_next().await {
        // Propagate error
        res??;
    }

    Ok(())
}
