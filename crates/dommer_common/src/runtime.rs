// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::config::AppConfig;
use crate::stores::Stores;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Common state for components.
#[derive(Clone)]
pub struct AppRuntime {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub cancellation_token: CancellationToken,
}

/// A token cancelled on SIGTERM/SIGINT. Components select on it at their
/// suspension points.
pub fn create_shutdown_cancellation_token() -> CancellationToken {
    let cancellation_token = CancellationToken::new();
    let signal_cancellation_token = cancellation_token.clone();

    spawn(async move {
        let (mut terminate, mut interrupt) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(terminate), Ok(interrupt)) => (terminate, interrupt),
            (Err(error), _) | (_, Err(error)) => {
                error! {
                    ?error,
                    "unable to listen for shutdown signals"
                }
                return;
            }
        };

        select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        info!("shutdown signal received");
        signal_cancellation_token.cancel();
    });
    cancellation_token
}
