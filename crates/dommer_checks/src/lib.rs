// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! The service catalog: every check variant the engine can run against a
//! team's box, plus the configuration registry that constructs them.

pub mod http;
pub mod random;
pub mod ssh;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A username/secret pair drawn from a team's credlist copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub secret: String,
}

/// Everything a single check execution needs to know about its target.
#[derive(Debug, Clone)]
pub struct CheckTarget {
    pub addr: Ipv4Addr,
    pub cred: Option<Credential>,
}

/// The result of one check execution. Failures are scoring outcomes, not
/// errors; the message is surfaced in the round's score report.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        CheckOutcome {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        CheckOutcome {
            passed: false,
            message: message.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CheckConfigError {
    #[error("ssh check requires at least one credlist")]
    MissingCredlist,
    #[error("ssh check with pubkey auth requires a keyfile")]
    MissingKeyfile,
    #[error("duplicate service of kind `{0}` on the same box")]
    DuplicateService(&'static str),
    #[error("random check delay range is inverted ({min}..{max})")]
    InvalidDelayRange { min: u64, max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Plaintext,
    Pubkey,
}

/// The configuration registry: one tagged variant per check kind. Adding a
/// new check type means adding a variant here and a module implementing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceConfig {
    Ssh {
        #[serde(default)]
        credlists: Vec<String>,
        #[serde(default = "default_ssh_port")]
        port: u16,
        #[serde(default)]
        auth: Vec<AuthMethod>,
        #[serde(default)]
        keyfile: Option<String>,
    },
    Http {
        #[serde(default = "default_http_port")]
        port: u16,
        #[serde(default)]
        path: Option<String>,
    },
    Https {
        #[serde(default = "default_https_port")]
        port: u16,
        #[serde(default)]
        path: Option<String>,
    },
    Random {
        /// Bounds for the artificial delay, in milliseconds.
        #[serde(default)]
        min_delay_ms: u64,
        #[serde(default)]
        max_delay_ms: u64,
    },
}

fn default_ssh_port() -> u16 {
    22
}

fn default_http_port() -> u16 {
    80
}

fn default_https_port() -> u16 {
    443
}

impl ServiceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceConfig::Ssh { .. } => "ssh",
            ServiceConfig::Http { .. } => "http",
            ServiceConfig::Https { .. } => "https",
            ServiceConfig::Random { .. } => "random",
        }
    }

    /// Validates the configuration and constructs the check. Missing
    /// mandatory fields are configuration errors, never runtime ones.
    pub fn compile(&self) -> Result<Service, CheckConfigError> {
        let service = match self {
            ServiceConfig::Ssh {
                credlists,
                port,
                auth,
                keyfile,
            } => {
                if credlists.is_empty() {
                    return Err(CheckConfigError::MissingCredlist);
                }
                let auth = if auth.is_empty() {
                    vec![AuthMethod::Plaintext]
                } else {
                    auth.clone()
                };
                if auth.contains(&AuthMethod::Pubkey) && keyfile.is_none() {
                    return Err(CheckConfigError::MissingKeyfile);
                }
                Service::Ssh(ssh::SshCheck {
                    credlists: credlists.clone(),
                    port: *port,
                    auth,
                    keyfile: keyfile.clone(),
                })
            }
            ServiceConfig::Http { port, path } => Service::Http(http::HttpCheck {
                tls: false,
                port: *port,
                path: path.clone(),
            }),
            ServiceConfig::Https { port, path } => Service::Http(http::HttpCheck {
                tls: true,
                port: *port,
                path: path.clone(),
            }),
            ServiceConfig::Random {
                min_delay_ms,
                max_delay_ms,
            } => {
                if min_delay_ms > max_delay_ms {
                    return Err(CheckConfigError::InvalidDelayRange {
                        min: *min_delay_ms,
                        max: *max_delay_ms,
                    });
                }
                Service::Random(random::RandomCheck {
                    min_delay_ms: *min_delay_ms,
                    max_delay_ms: *max_delay_ms,
                })
            }
        };
        Ok(service)
    }
}

/// A compiled, immutable check. Equality is structural so that the
/// scheduler can detect configuration drift between rounds.
#[derive(Debug, Clone, PartialEq)]
pub enum Service {
    Ssh(ssh::SshCheck),
    Http(http::HttpCheck),
    Random(random::RandomCheck),
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Ssh(..) => "ssh",
            Service::Http(check) if check.tls => "https",
            Service::Http(..) => "http",
            Service::Random(..) => "random",
        }
    }

    /// The credlists this check draws credentials from, if any.
    pub fn credlists(&self) -> Option<&[String]> {
        match self {
            Service::Ssh(check) => Some(&check.credlists),
            _ => None,
        }
    }

    /// Runs the check against the target. The variant applies no timeout of
    /// its own; the round deadline bounds the execution.
    pub async fn check(&self, target: &CheckTarget) -> CheckOutcome {
        match self {
            Service::Ssh(check) => check.check(target).await,
            Service::Http(check) => check.check(target).await,
            Service::Random(check) => check.check(target).await,
        }
    }
}

/// Compiles every service configured on a box, rejecting duplicates of the
/// same kind (service names are `box.kind` and must stay unique).
pub fn compile_services(configs: &[ServiceConfig]) -> Result<Vec<Service>, CheckConfigError> {
    let mut services = Vec::with_capacity(configs.len());
    for config in configs {
        if configs.iter().filter(|c| c.kind() == config.kind()).count() > 1 {
            return Err(CheckConfigError::DuplicateService(config.kind()));
        }
        services.push(config.compile()?);
    }
    Ok(services)
}
