// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! End-to-end round loop tests against real listeners on the loopback
//! range. The competition network prefix is set to `127.0` so the engine's
//! computed target addresses (`127.0.<team>.<box>`) are bindable locally.

use async_trait::async_trait;
use dommer_common::config::AppConfig;
use dommer_common::models::TeamRecord;
use dommer_common::stores::memory::MemoryStores;
use dommer_common::stores::{StoreError, TeamStore};
use dommer_engine::engine::{Engine, EngineError};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn config(teams: &str) -> AppConfig {
    let toml = format!(
        r#"
        [competition]
        name = "loopback cup"

        [competition.settings]
        first_octets = "127.0"
        check_time = 2
        check_jitter = 0
        check_timeout = 1
        check_points = 10.0
        sla_requirement = 2
        sla_penalty = 100.0

        [[boxes]]
        name = "web"
        identifier = 5
        [[boxes.services]]
        type = "http"
        port = 8080

        {teams}
        "#
    );
    toml::from_str(&toml).unwrap()
}

/// Accepts connections forever and answers every request with a 200.
async fn serve_http(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    )
                    .await;
            });
        }
    });
}

/// A team store that fails the first `failures` score updates, then
/// recovers.
struct FlakyTeams {
    inner: Arc<MemoryStores>,
    failures: AtomicU32,
    attempts: AtomicU32,
}

#[async_trait]
impl TeamStore for FlakyTeams {
    async fn list_teams(&self) -> Result<Vec<TeamRecord>, StoreError> {
        self.inner.list_teams().await
    }

    async fn update_score(&self, identifier: u8, total: f64) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("scoreboard offline".to_string()));
        }
        self.inner.update_score(identifier, total).await
    }
}

async fn wait_until_stopped(handle: &dommer_engine::EngineHandle) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if !handle.status().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("engine did not finish in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn should_score_three_rounds_with_sla_penalties() {
    let config = config(
        r#"
        [[teams]]
        name = "team01"
        identifier = 1
        [[teams]]
        name = "team02"
        identifier = 2
        "#,
    );
    let stores = MemoryStores::from_config(&config).unwrap();

    // team 1's web box answers, team 2's does not exist
    serve_http(SocketAddr::from((Ipv4Addr::new(127, 0, 1, 5), 8080))).await;

    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(stores.handles(), None, token.clone());
    let run = tokio::spawn(engine.run());

    handle.start(3).await.unwrap();
    wait_until_stopped(&handle).await;

    let status = handle.status();
    assert!(!status.running);
    assert_eq!(status.round, 3);

    // team 1: three passes at 10 points each
    assert_eq!(stores.total_for(1), Some(30.0));
    let report = stores.score_report_for(1, 3).unwrap();
    assert_eq!(report.total, 30.0);
    assert!(report.messages.contains_key("web.http"));

    // team 2: three failures, one SLA violation on round 2, streak back at 1
    assert_eq!(stores.total_for(2), Some(-100.0));
    let violations = stores.sla_reports();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].team, 2);
    assert_eq!(violations[0].round, 2);
    assert_eq!(violations[0].service, "web.http");

    token.cancel();
    let _ = run.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn should_retry_a_round_after_a_persistence_failure() {
    let config = config(
        r#"
        [[teams]]
        name = "team09"
        identifier = 9
        "#,
    );
    let stores = MemoryStores::from_config(&config).unwrap();
    serve_http(SocketAddr::from((Ipv4Addr::new(127, 0, 9, 5), 8080))).await;

    let teams = Arc::new(FlakyTeams {
        inner: stores.clone(),
        failures: AtomicU32::new(1),
        attempts: AtomicU32::new(0),
    });
    let mut handles = stores.handles();
    handles.teams = teams.clone();

    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(handles, None, token.clone());
    let run = tokio::spawn(engine.run());
    handle.start(1).await.unwrap();

    // wait for the first, failing persistence attempt
    tokio::time::timeout(Duration::from_secs(30), async {
        while teams.attempts.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no persistence attempt observed");

    // the aborted round surfaced nothing: counter stalled, still running,
    // no report persisted, total untouched
    let status = handle.status();
    assert!(status.running);
    assert_eq!(status.round, 1);
    assert_eq!(stores.total_for(9), Some(0.0));
    assert!(stores.score_report_for(9, 1).is_none());

    // the next tick retries round 1 and succeeds
    wait_until_stopped(&handle).await;
    assert_eq!(teams.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(handle.status().round, 1);
    assert_eq!(stores.total_for(9), Some(10.0));
    assert_eq!(stores.score_report_for(9, 1).unwrap().total, 10.0);

    token.cancel();
    let _ = run.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn should_reject_roster_changes_while_running() {
    let config = config(
        r#"
        [[teams]]
        name = "team01"
        identifier = 1
        "#,
    );
    let stores = MemoryStores::from_config(&config).unwrap();
    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(stores.handles(), None, token.clone());
    let run = tokio::spawn(engine.run());

    handle.start(2).await.unwrap();
    let refused = handle.refresh_teams().await;
    assert!(matches!(refused, Err(EngineError::EngineRunning)));

    wait_until_stopped(&handle).await;
    // back in idle, the roster can be re-read again
    assert_eq!(handle.refresh_teams().await.unwrap(), 1);

    token.cancel();
    let _ = run.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn should_stop_an_unbounded_run_on_command() {
    let config = config(
        r#"
        [[teams]]
        name = "team01"
        identifier = 1
        "#,
    );
    let stores = MemoryStores::from_config(&config).unwrap();
    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(stores.handles(), None, token.clone());
    let run = tokio::spawn(engine.run());

    handle.start(0).await.unwrap();
    assert!(handle.status().running);
    handle.stop().await.unwrap();
    wait_until_stopped(&handle).await;
    assert!(!handle.status().running);

    token.cancel();
    let _ = run.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn should_pause_and_resume_between_rounds() {
    let config = config(
        r#"
        [[teams]]
        name = "team01"
        identifier = 1
        "#,
    );
    let stores = MemoryStores::from_config(&config).unwrap();
    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(stores.handles(), None, token.clone());
    let run = tokio::spawn(engine.run());

    handle.start(0).await.unwrap();
    handle.pause().await.unwrap();
    tokio::time::timeout(Duration::from_secs(30), async {
        while !handle.status().paused {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("engine did not pause");
    assert!(handle.status().running);

    handle.resume().await.unwrap();
    handle.stop().await.unwrap();
    wait_until_stopped(&handle).await;
    assert!(!handle.status().paused);

    token.cancel();
    let _ = run.await;
}

#[tokio::test(flavor = "multi_thread")]
async fn should_refuse_to_start_without_teams() {
    let config = config("");
    let stores = MemoryStores::from_config(&config).unwrap();
    let token = CancellationToken::new();
    let (engine, handle) = Engine::new(stores.handles(), None, token.clone());
    let run = tokio::spawn(engine.run());

    let refused = handle.start(1).await;
    assert!(matches!(refused, Err(EngineError::NoTeams)));
    assert!(!handle.status().running);

    token.cancel();
    let _ = run.await;
}
