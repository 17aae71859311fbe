// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use crate::config::AppConfig;
use crate::models::{
    BoxRecord, CredlistRecord, InjectError, InjectRecord, InjectReport, ScoreReport, Settings,
    SlaReport, TeamRecord,
};
use crate::stores::{
    BoxStore, CredlistStore, InjectReportStore, InjectStore, ReportSink, SettingsStore, StoreError,
    Stores, TeamStore,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dommer_checks::CheckConfigError;
use std::sync::Arc;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("box `{name}`: {source}")]
    InvalidService {
        name: String,
        source: CheckConfigError,
    },
    #[error("box identifier must be in 1..=255: `{0}`")]
    ZeroBoxIdentifier(String),
    #[error("duplicate box name `{0}`")]
    DuplicateBoxName(String),
    #[error("duplicate box identifier {0}")]
    DuplicateBoxIdentifier(u8),
    #[error("box `{box_name}` references unknown credlist `{credlist}`")]
    UnknownCredlist { box_name: String, credlist: String },
    #[error("duplicate credlist `{0}`")]
    DuplicateCredlist(String),
    #[error("team identifier must be in 1..=255: `{0}`")]
    ZeroTeamIdentifier(String),
    #[error("duplicate team identifier {0}")]
    DuplicateTeamIdentifier(u8),
    #[error("duplicate inject id {0}")]
    DuplicateInject(u32),
    #[error(transparent)]
    Inject(#[from] InjectError),
}

/// DashMap-backed implementation of every store trait. This is the default
/// (and test) persistence layer; a database-backed one would implement the
/// same traits.
#[derive(Debug, Default)]
pub struct MemoryStores {
    settings: Settings,
    boxes: DashMap<String, BoxRecord>,
    credlists: DashMap<String, CredlistRecord>,
    teams: DashMap<u8, TeamRecord>,
    totals: DashMap<u8, f64>,
    injects: DashMap<u32, InjectRecord>,
    inject_reports: DashMap<(u8, u32), InjectReport>,
    score_reports: DashMap<(u8, u32), ScoreReport>,
    sla_reports: std::sync::Mutex<Vec<SlaReport>>,
}

impl MemoryStores {
    /// Seeds the stores from the competition configuration, rejecting
    /// malformed records up front rather than mid-round.
    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>, ConfigError> {
        let stores = MemoryStores {
            settings: config.competition.settings.clone(),
            ..Default::default()
        };

        for credlist in &config.credlists {
            if stores
                .credlists
                .insert(credlist.name.clone(), credlist.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateCredlist(credlist.name.clone()));
            }
        }

        for box_record in &config.boxes {
            if box_record.identifier == 0 {
                return Err(ConfigError::ZeroBoxIdentifier(box_record.name.clone()));
            }
            let compiled =
                box_record
                    .compile()
                    .map_err(|source| ConfigError::InvalidService {
                        name: box_record.name.clone(),
                        source,
                    })?;
            for service in &compiled.services {
                for credlist in service.credlists().unwrap_or_default() {
                    if !stores.credlists.contains_key(credlist) {
                        return Err(ConfigError::UnknownCredlist {
                            box_name: box_record.name.clone(),
                            credlist: credlist.clone(),
                        });
                    }
                }
            }
            if stores
                .boxes
                .iter()
                .any(|b| b.identifier == box_record.identifier)
            {
                return Err(ConfigError::DuplicateBoxIdentifier(box_record.identifier));
            }
            if stores
                .boxes
                .insert(box_record.name.clone(), box_record.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateBoxName(box_record.name.clone()));
            }
        }

        for team in &config.teams {
            if team.identifier == 0 {
                return Err(ConfigError::ZeroTeamIdentifier(team.name.clone()));
            }
            if stores
                .teams
                .insert(team.identifier, team.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateTeamIdentifier(team.identifier));
            }
            stores.totals.insert(team.identifier, 0.0);
        }

        for inject in &config.injects {
            // Derive the breakdown once so bad rubrics are rejected at load.
            inject.score_breakdown()?;
            if stores.injects.insert(inject.id, inject.clone()).is_some() {
                return Err(ConfigError::DuplicateInject(inject.id));
            }
        }

        debug!(
            boxes = stores.boxes.len(),
            credlists = stores.credlists.len(),
            teams = stores.teams.len(),
            injects = stores.injects.len(),
            "seeded in-memory stores"
        );
        Ok(Arc::new(stores))
    }

    /// One `Stores` handle sharing this backing store across all traits.
    pub fn handles(self: &Arc<Self>) -> Stores {
        Stores {
            boxes: self.clone(),
            credlists: self.clone(),
            teams: self.clone(),
            injects: self.clone(),
            inject_reports: self.clone(),
            settings: self.clone(),
            reports: self.clone(),
        }
    }

    pub fn total_for(&self, team: u8) -> Option<f64> {
        self.totals.get(&team).map(|total| *total)
    }

    pub fn score_report_for(&self, team: u8, round: u32) -> Option<ScoreReport> {
        self.score_reports
            .get(&(team, round))
            .map(|report| report.clone())
    }

    pub fn inject_report_for(&self, team: u8, inject: u32) -> Option<InjectReport> {
        self.inject_reports
            .get(&(team, inject))
            .map(|report| report.clone())
    }

    pub fn sla_reports(&self) -> Vec<SlaReport> {
        self.sla_reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BoxStore for MemoryStores {
    async fn list_boxes(&self) -> Result<Vec<BoxRecord>, StoreError> {
        Ok(self.boxes.iter().map(|b| b.clone()).collect())
    }
}

#[async_trait]
impl CredlistStore for MemoryStores {
    async fn list_credlists(&self) -> Result<Vec<CredlistRecord>, StoreError> {
        Ok(self.credlists.iter().map(|c| c.clone()).collect())
    }
}

#[async_trait]
impl TeamStore for MemoryStores {
    async fn list_teams(&self) -> Result<Vec<TeamRecord>, StoreError> {
        Ok(self.teams.iter().map(|t| t.clone()).collect())
    }

    async fn update_score(&self, identifier: u8, total: f64) -> Result<(), StoreError> {
        if !self.teams.contains_key(&identifier) {
            return Err(StoreError::NotFound(format!("team {identifier}")));
        }
        self.totals.insert(identifier, total);
        Ok(())
    }
}

#[async_trait]
impl InjectStore for MemoryStores {
    async fn list_injects(&self) -> Result<Vec<InjectRecord>, StoreError> {
        Ok(self.injects.iter().map(|i| i.clone()).collect())
    }
}

#[async_trait]
impl InjectReportStore for MemoryStores {
    async fn upsert(&self, report: InjectReport) -> Result<(), StoreError> {
        self.inject_reports
            .insert((report.team, report.inject), report);
        Ok(())
    }

    async fn list_for_team(&self, team: u8) -> Result<Vec<InjectReport>, StoreError> {
        Ok(self
            .inject_reports
            .iter()
            .filter(|r| r.team == team)
            .map(|r| r.clone())
            .collect())
    }
}

#[async_trait]
impl SettingsStore for MemoryStores {
    async fn current(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.clone())
    }
}

#[async_trait]
impl ReportSink for MemoryStores {
    async fn write_score_report(&self, report: ScoreReport) -> Result<(), StoreError> {
        self.score_reports
            .insert((report.team, report.round), report);
        Ok(())
    }

    async fn write_sla_report(&self, report: SlaReport) -> Result<(), StoreError> {
        self.sla_reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report);
        Ok(())
    }
}
