// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! Shared models used across the stores, the engine, and the binary.

pub mod inject;
pub mod settings;

pub use inject::{InjectError, InjectRecord, RubricCategory};
pub use settings::{Settings, SettingsError};

use dommer_checks::{CheckConfigError, Service, ServiceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target host definition: one identifying octet and its configured
/// services. Persisted as raw configuration; compiled fresh each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BoxRecord {
    pub name: String,
    /// Maps to the last octet of the box inside every team's subnet.
    pub identifier: u8,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl BoxRecord {
    /// Resolves the persisted configuration into compiled checks.
    pub fn compile(&self) -> Result<CompiledBox, CheckConfigError> {
        Ok(CompiledBox {
            name: self.name.clone(),
            identifier: self.identifier,
            services: dommer_checks::compile_services(&self.services)?,
        })
    }
}

/// A round's snapshot of one box: compiled checks, discarded after
/// tabulation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBox {
    pub name: String,
    pub identifier: u8,
    pub services: Vec<Service>,
}

impl CompiledBox {
    /// Every service on this box in the flattened `box.service` form.
    pub fn service_names(&self) -> impl Iterator<Item = String> + '_ {
        self.services
            .iter()
            .map(|service| format!("{}.{}", self.name, service.name()))
    }

    /// The flattened `box.service` name set across all boxes.
    pub fn full_service_list(boxes: &[CompiledBox]) -> Vec<String> {
        boxes.iter().flat_map(|b| b.service_names()).collect()
    }
}

/// A named user → secret mapping. The global template is read-only after
/// load; teams receive independent mutable copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CredlistRecord {
    pub name: String,
    pub creds: BTreeMap<String, String>,
}

/// A competing team. The identifier addresses the team's subnet
/// (`first_octets.identifier.box_identifier`) and is stable for the
/// competition's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TeamRecord {
    pub name: String,
    pub identifier: u8,
}

/// One team's persisted score total and per-service diagnostics for one
/// round. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoreReport {
    pub team: u8,
    pub round: u32,
    pub total: f64,
    pub messages: BTreeMap<String, String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// One SLA violation: a team's service failed `sla_requirement` rounds in a
/// row, the last of them being `round`. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SlaReport {
    pub team: u8,
    pub round: u32,
    pub service: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A graded inject for one team. Re-grading overwrites the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InjectReport {
    pub team: u8,
    pub inject: u32,
    pub score: f64,
}
