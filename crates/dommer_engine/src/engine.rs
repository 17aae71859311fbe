// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! The round scheduler. One long-lived control loop drives rounds of
//! parallel checks, tabulates the results into team ledgers, and persists
//! reports. Control arrives over a command channel; status is published
//! through a lock-free cell so reads never contend with a running round.

use crate::creds::{CredentialError, CredentialLedger};
use crate::dispatch::{self, CheckTask};
use crate::scoring::TeamLedger;
use chrono::Utc;
use dommer_checks::{CheckConfigError, CheckTarget};
use dommer_common::models::{CompiledBox, ScoreReport, Settings, SettingsError, SlaReport};
use dommer_common::stores::{StoreError, Stores};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("the engine is already running")]
    EngineRunning,
    #[error("cannot start scoring without any teams")]
    NoTeams,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("the engine has shut down")]
    EngineGone,
}

/// Why a round had to be abandoned. The round counter does not advance on
/// any of these; the next tick retries the same round.
#[derive(Error, Debug)]
enum RoundError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("settings became invalid: {0}")]
    Settings(#[from] SettingsError),
    #[error("box `{name}`: {source}")]
    InvalidBox {
        name: String,
        source: CheckConfigError,
    },
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

enum Command {
    Start {
        round_limit: u32,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Pause,
    Resume,
    Stop,
    RefreshTeams {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    Rotate {
        team: u8,
        credlist: String,
        updates: BTreeMap<String, String>,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Published scheduler state. Stored as atomics so `status()` never waits
/// on an in-flight round.
#[derive(Default)]
pub struct StatusCell {
    running: AtomicBool,
    paused: AtomicBool,
    round: AtomicU32,
}

impl StatusCell {
    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn set_round(&self, round: u32) {
        self.round.store(round, Ordering::SeqCst);
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> EngineStatus {
        EngineStatus {
            running: self.running.load(Ordering::Acquire),
            paused: self.paused.load(Ordering::Acquire),
            round: self.round.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    pub paused: bool,
    pub round: u32,
}

/// The control surface handed to collaborators (the binary, an API layer).
/// Cheap to clone; every method is safe to call from any task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    status: Arc<StatusCell>,
}

impl EngineHandle {
    /// Starts scoring. `round_limit` of 0 means unbounded.
    pub async fn start(&self, round_limit: u32) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { round_limit, reply }).await?;
        rx.await.map_err(|_| EngineError::EngineGone)?
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        self.send(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.send(Command::Stop).await
    }

    pub fn status(&self) -> EngineStatus {
        self.status.snapshot()
    }

    /// Re-reads the team store. Rejected while the scheduler is running so
    /// an in-progress round never sees the roster change under it.
    pub async fn refresh_teams(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RefreshTeams { reply }).await?;
        rx.await.map_err(|_| EngineError::EngineGone)?
    }

    /// Submits a password change request for one team's credlist copy.
    /// Returns the number of users whose secret was updated.
    pub async fn rotate(
        &self,
        team: u8,
        credlist: impl Into<String>,
        updates: BTreeMap<String, String>,
    ) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Rotate {
            team,
            credlist: credlist.into(),
            updates,
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::EngineGone)?
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::EngineGone)
    }
}

pub struct Engine {
    stores: Stores,
    status: Arc<StatusCell>,
    rx: mpsc::Receiver<Command>,
    token: CancellationToken,
    export_dir: Option<PathBuf>,
    settings: Settings,
    creds: CredentialLedger,
    ledgers: BTreeMap<u8, TeamLedger>,
}

impl Engine {
    pub fn new(
        stores: Stores,
        export_dir: Option<PathBuf>,
        token: CancellationToken,
    ) -> (Engine, EngineHandle) {
        let (tx, rx) = mpsc::channel(16);
        let status = Arc::new(StatusCell::default());
        let engine = Engine {
            stores,
            status: status.clone(),
            rx,
            token,
            export_dir,
            settings: Settings::default(),
            creds: CredentialLedger::default(),
            ledgers: BTreeMap::new(),
        };
        (engine, EngineHandle { tx, status })
    }

    /// The engine's main loop. Idles on the command channel until a start
    /// arrives, then drives rounds until stop, the round limit, or
    /// shutdown.
    pub async fn run(mut self) -> Result<(), RunError> {
        self.settings = self.stores.settings.current().await?;
        self.settings.validate()?;
        self.sync_teams().await?;

        loop {
            select! {
                _ = self.token.cancelled() => {
                    debug!("engine shutting down");
                    return Ok(());
                }
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        return Ok(());
                    };
                    if let Some(round_limit) = self.handle_idle_command(command).await {
                        self.run_scoring(round_limit).await;
                        if self.token.is_cancelled() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Handles one command while idle. Returns the round limit when the
    /// command was an accepted start.
    async fn handle_idle_command(&mut self, command: Command) -> Option<u32> {
        match command {
            Command::Start { round_limit, reply } => {
                let result = if self.ledgers.is_empty() {
                    Err(EngineError::NoTeams)
                } else {
                    Ok(())
                };
                let accepted = result.is_ok();
                if accepted {
                    // visible before the caller's start() resolves
                    self.status.set_running(true);
                }
                let _ = reply.send(result);
                if accepted {
                    return Some(round_limit);
                }
            }
            // pause/resume/stop are no-ops outside a run
            Command::Pause | Command::Resume | Command::Stop => {}
            Command::RefreshTeams { reply } => {
                let result = self.sync_teams().await.map_err(EngineError::from);
                let _ = reply.send(result);
            }
            Command::Rotate {
                team,
                credlist,
                updates,
                reply,
            } => {
                let result = self
                    .creds
                    .rotate(team, &credlist, &updates)
                    .map_err(EngineError::from);
                let _ = reply.send(result);
            }
        }
        None
    }

    /// Handles one command while running. Returns true if a stop was
    /// requested.
    fn handle_running_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { reply, .. } => {
                let _ = reply.send(Err(EngineError::EngineRunning));
            }
            Command::Pause => {
                info!("scoring paused");
                self.status.set_paused(true);
            }
            Command::Resume => {
                info!("scoring resumed");
                self.status.set_paused(false);
            }
            Command::Stop => {
                info!("scoring stopped");
                return true;
            }
            Command::RefreshTeams { reply } => {
                let _ = reply.send(Err(EngineError::EngineRunning));
            }
            Command::Rotate {
                team,
                credlist,
                updates,
                reply,
            } => {
                // between-round only: the sleep and pause gates are the
                // sole places commands are drained mid-run
                let result = self
                    .creds
                    .rotate(team, &credlist, &updates)
                    .map_err(EngineError::from);
                let _ = reply.send(result);
            }
        }
        false
    }

    async fn run_scoring(&mut self, round_limit: u32) {
        info!(round_limit, "scoring started");
        self.status.set_running(true);
        let mut round: u32 = 1;

        loop {
            self.status.set_round(round);
            match self.score_round(round).await {
                Ok(()) => {
                    if round_limit != 0 && round >= round_limit {
                        info!(round, "round limit reached");
                        break;
                    }
                    round += 1;
                }
                Err(round_error) => {
                    // counter stays put; the next tick retries this round
                    error!(%round_error, round, "round aborted");
                }
            }
            if !self.sleep_between_rounds().await {
                break;
            }
        }

        self.status.set_running(false);
        self.status.set_paused(false);
        info!("scoring finished");
    }

    /// Sleeps `check_time ± check_jitter`, serving control commands the
    /// whole time, then holds at the pause gate for as long as the pause
    /// flag is up. Returns false when the run should end.
    async fn sleep_between_rounds(&mut self) -> bool {
        let secs = self.jittered_sleep_secs();
        debug!(secs, "sleeping until next round");
        let sleep = tokio::time::sleep(Duration::from_secs(secs));
        tokio::pin!(sleep);

        loop {
            select! {
                _ = self.token.cancelled() => return false,
                _ = &mut sleep => break,
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        return false;
                    };
                    if self.handle_running_command(command) {
                        return false;
                    }
                }
            }
        }

        while self.status.paused() {
            select! {
                _ = self.token.cancelled() => return false,
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        return false;
                    };
                    if self.handle_running_command(command) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn jittered_sleep_secs(&self) -> u64 {
        let time = self.settings.check_time as i64;
        let jitter = self.settings.check_jitter as i64;
        let offset = if jitter > 0 {
            rand::random_range(-jitter..=jitter)
        } else {
            0
        };
        // validation guarantees jitter < time
        (time + offset).max(0) as u64
    }

    /// Re-reads the team roster and seeds scoring and credential state for
    /// teams seen for the first time. Existing ledgers are kept.
    async fn sync_teams(&mut self) -> Result<usize, StoreError> {
        let teams = self.stores.teams.list_teams().await?;
        let credlists = self.stores.credlists.list_credlists().await?;
        for team in &teams {
            if !self.ledgers.contains_key(&team.identifier) {
                self.ledgers.insert(
                    team.identifier,
                    TeamLedger::new(team.name.clone(), team.identifier),
                );
                self.creds.add_team(team.identifier, &credlists);
            }
        }
        debug!(teams = teams.len(), "synced team roster");
        Ok(teams.len())
    }

    /// Runs one full round: snapshot configuration, fan out the check
    /// matrix under the round deadline, merge into the presumed-guilty
    /// table, tabulate and persist per team.
    async fn score_round(&mut self, round: u32) -> Result<(), RoundError> {
        let settings = self.stores.settings.current().await?;
        settings.validate()?;
        self.settings = settings.clone();

        let boxes = self.snapshot_boxes().await?;
        let service_names = CompiledBox::full_service_list(&boxes);
        info!(round, services = service_names.len(), "round started");

        // presumed guilty: every (team, service) starts failed
        let mut table: BTreeMap<u8, BTreeMap<String, (bool, String)>> = self
            .ledgers
            .keys()
            .map(|&team| {
                let row = service_names
                    .iter()
                    .map(|name| (name.clone(), (false, "check timed out".to_string())))
                    .collect();
                (team, row)
            })
            .collect();

        let tasks = self.build_check_matrix(&settings, &boxes)?;
        let results = dispatch::run(tasks, Duration::from_secs(settings.check_timeout)).await;
        for result in results {
            if let Some(entry) = table
                .get_mut(&result.team)
                .and_then(|row| row.get_mut(&result.service))
            {
                *entry = (result.passed, result.message);
            }
        }

        // Tabulate on clones first; commit only after every report
        // persisted, so an aborted round leaves the ledgers untouched.
        let mut staged = Vec::with_capacity(self.ledgers.len());
        for (&team, ledger) in &self.ledgers {
            let Some(results) = table.get(&team) else {
                continue;
            };
            let injects = self.stores.inject_reports.list_for_team(team).await?;
            let mut ledger = ledger.clone();
            let tabulation = ledger.tabulate(round, &settings, results, &injects);

            for service in tabulation.sla_violations {
                self.stores
                    .reports
                    .write_sla_report(SlaReport {
                        team,
                        round,
                        service,
                        at: Utc::now(),
                    })
                    .await?;
            }
            self.stores.teams.update_score(team, tabulation.total).await?;
            self.stores
                .reports
                .write_score_report(ScoreReport {
                    team,
                    round,
                    total: tabulation.total,
                    messages: results
                        .iter()
                        .map(|(name, (_, message))| (name.clone(), message.clone()))
                        .collect(),
                    at: Utc::now(),
                })
                .await?;
            staged.push(ledger);
        }
        for ledger in staged {
            self.ledgers.insert(ledger.identifier, ledger);
        }

        self.export_breakdowns().await;
        info!(round, "round tabulated");
        Ok(())
    }

    async fn snapshot_boxes(&self) -> Result<Vec<CompiledBox>, RoundError> {
        let mut boxes = Vec::new();
        for record in self.stores.boxes.list_boxes().await? {
            let compiled = record.compile().map_err(|source| RoundError::InvalidBox {
                name: record.name.clone(),
                source,
            })?;
            boxes.push(compiled);
        }
        Ok(boxes)
    }

    fn build_check_matrix(
        &self,
        settings: &Settings,
        boxes: &[CompiledBox],
    ) -> Result<Vec<CheckTask>, RoundError> {
        let mut tasks = Vec::new();
        for compiled in boxes {
            for service in &compiled.services {
                for &team in self.ledgers.keys() {
                    let cred = match service.credlists() {
                        Some(candidates) => Some(self.creds.draw(team, candidates)?),
                        None => None,
                    };
                    tasks.push(CheckTask {
                        team,
                        service: format!("{}.{}", compiled.name, service.name()),
                        check: service.clone(),
                        target: CheckTarget {
                            addr: settings.address(team, compiled.identifier),
                            cred,
                        },
                    });
                }
            }
        }
        Ok(tasks)
    }

    /// Writes one CSV score breakdown per team. Export trouble is logged,
    /// never fatal to the round.
    async fn export_breakdowns(&self) {
        let Some(dir) = &self.export_dir else {
            return;
        };
        for ledger in self.ledgers.values() {
            let path = dir.join(format!("{}.csv", ledger.name));
            if let Err(error) = tokio::fs::write(&path, ledger.export_csv()).await {
                warn!(%error, path = %path.display(), "could not export score breakdown");
            }
        }
    }
}

/// Startup failures: the scheduler refuses to construct itself on invalid
/// settings or an unreachable store.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
}
