// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! The persistence seams the engine reads configuration from and writes
//! scores/reports to. The CRUD/API layer sits behind the same traits.

pub mod memory;

use crate::models::{
    BoxRecord, CredlistRecord, InjectRecord, InjectReport, ScoreReport, Settings, SlaReport,
    TeamRecord,
};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BoxStore: Send + Sync {
    async fn list_boxes(&self) -> Result<Vec<BoxRecord>, StoreError>;
}

#[async_trait]
pub trait CredlistStore: Send + Sync {
    async fn list_credlists(&self) -> Result<Vec<CredlistRecord>, StoreError>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn list_teams(&self) -> Result<Vec<TeamRecord>, StoreError>;
    async fn update_score(&self, identifier: u8, total: f64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait InjectStore: Send + Sync {
    async fn list_injects(&self) -> Result<Vec<InjectRecord>, StoreError>;
}

#[async_trait]
pub trait InjectReportStore: Send + Sync {
    /// Overwrites any previous grade for the same `(team, inject)` pair.
    async fn upsert(&self, report: InjectReport) -> Result<(), StoreError>;
    async fn list_for_team(&self, team: u8) -> Result<Vec<InjectReport>, StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn current(&self) -> Result<Settings, StoreError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write_score_report(&self, report: ScoreReport) -> Result<(), StoreError>;
    async fn write_sla_report(&self, report: SlaReport) -> Result<(), StoreError>;
}

/// The full set of store handles handed to components.
#[derive(Clone)]
pub struct Stores {
    pub boxes: Arc<dyn BoxStore>,
    pub credlists: Arc<dyn CredlistStore>,
    pub teams: Arc<dyn TeamStore>,
    pub injects: Arc<dyn InjectStore>,
    pub inject_reports: Arc<dyn InjectReportStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub reports: Arc<dyn ReportSink>,
}
