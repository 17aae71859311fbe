// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::{CheckOutcome, CheckTarget};
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// A synthetic check that flips a coin, optionally after a random delay
/// drawn from the configured range. Useful for exercising the scoring
/// pipeline without real targets.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomCheck {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RandomCheck {
    pub(crate) async fn check(&self, target: &CheckTarget) -> CheckOutcome {
        let (delay_ms, passed) = {
            let mut rng = rand::rng();
            let delay_ms = if self.max_delay_ms > 0 {
                rng.random_range(self.min_delay_ms..=self.max_delay_ms)
            } else {
                0
            };
            (delay_ms, rng.random_bool(0.5))
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        debug!(addr = %target.addr, passed, "conducted random check");
        if passed {
            CheckOutcome::pass("the coin came up heads")
        } else {
            CheckOutcome::fail("the coin came up tails")
        }
    }
}
