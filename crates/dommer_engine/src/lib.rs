// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

pub mod config;
pub mod creds;
pub mod dispatch;
pub mod engine;
pub mod inject;
pub mod scoring;

pub use engine::{Engine, EngineHandle, EngineStatus};
pub use inject::InjectGrader;

use color_eyre::eyre::Result;
use dommer_common::runtime::AppRuntime;
use tracing::{info, warn};

pub async fn main(runtime: AppRuntime, config: config::Config) -> Result<()> {
    info!("starting engine");
    let (engine, handle) = Engine::new(
        runtime.stores.clone(),
        config.engine_export_dir.clone(),
        runtime.cancellation_token.clone(),
    );

    if config.engine_autostart {
        let handle = handle.clone();
        let rounds = config.engine_rounds;
        tokio::spawn(async move {
            if let Err(error) = handle.start(rounds).await {
                warn!(%error, "autostart rejected");
            }
        });
    }

    engine.run().await?;
    Ok(())
}
