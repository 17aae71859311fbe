// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Round timing and scoring knobs, read-only per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    /// Nominal seconds between round starts.
    #[serde(default = "default_check_time")]
    pub check_time: u64,
    /// Uniform jitter applied to the inter-round sleep, in seconds.
    #[serde(default)]
    pub check_jitter: u64,
    /// The shared deadline for every check in a round, in seconds.
    #[serde(default = "default_check_timeout")]
    pub check_timeout: u64,
    /// Points awarded per passed check.
    #[serde(default = "default_check_points")]
    pub check_points: f64,
    /// Consecutive failed rounds before an SLA penalty lands.
    #[serde(default = "default_sla_requirement")]
    pub sla_requirement: u32,
    /// Points deducted per SLA violation.
    #[serde(default = "default_sla_penalty")]
    pub sla_penalty: f64,
    /// The first two octets of the competition network, e.g. `10.100`.
    pub first_octets: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            check_time: default_check_time(),
            check_jitter: 0,
            check_timeout: default_check_timeout(),
            check_points: default_check_points(),
            sla_requirement: default_sla_requirement(),
            sla_penalty: default_sla_penalty(),
            first_octets: "10.100".to_string(),
        }
    }
}

fn default_check_time() -> u64 {
    30
}

fn default_check_timeout() -> u64 {
    5
}

fn default_check_points() -> f64 {
    10.0
}

fn default_sla_requirement() -> u32 {
    5
}

fn default_sla_penalty() -> f64 {
    100.0
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("check_jitter ({jitter}s) must be less than check_time ({time}s)")]
    JitterExceedsRound { jitter: u64, time: u64 },
    #[error("check_timeout ({timeout}s) must be less than check_time - check_jitter ({window}s)")]
    TimeoutExceedsWindow { timeout: u64, window: u64 },
    #[error("sla_requirement must be at least 1")]
    SlaRequirementZero,
    #[error("first_octets `{0}` is not of the form `a.b`")]
    InvalidNetworkPrefix(String),
}

impl Settings {
    /// Enforced before the scheduler may be constructed: otherwise rounds
    /// could overlap or checks could never complete in time.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.check_jitter >= self.check_time {
            return Err(SettingsError::JitterExceedsRound {
                jitter: self.check_jitter,
                time: self.check_time,
            });
        }
        let window = self.check_time - self.check_jitter;
        if self.check_timeout >= window {
            return Err(SettingsError::TimeoutExceedsWindow {
                timeout: self.check_timeout,
                window,
            });
        }
        if self.sla_requirement < 1 {
            return Err(SettingsError::SlaRequirementZero);
        }
        self.network_prefix()?;
        Ok(())
    }

    /// Parses `first_octets` into the two leading address octets.
    pub fn network_prefix(&self) -> Result<(u8, u8), SettingsError> {
        let mut parts = self.first_octets.split('.');
        let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(SettingsError::InvalidNetworkPrefix(
                self.first_octets.clone(),
            ));
        };
        let parse = |part: &str| {
            part.parse::<u8>()
                .map_err(|_| SettingsError::InvalidNetworkPrefix(self.first_octets.clone()))
        };
        Ok((parse(first)?, parse(second)?))
    }

    /// The address of `box_identifier` inside `team_identifier`'s subnet.
    pub fn address(&self, team_identifier: u8, box_identifier: u8) -> Ipv4Addr {
        // network_prefix is checked during validation
        let (first, second) = self.network_prefix().unwrap_or((0, 0));
        Ipv4Addr::new(first, second, team_identifier, box_identifier)
    }
}
