// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! The round's fan-out/fan-in primitive: run every check concurrently,
//! return whatever completed before the shared deadline, abandon the rest.

use dommer_checks::{CheckTarget, Service};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One `(team, box.service)` check to execute.
pub struct CheckTask {
    pub team: u8,
    pub service: String,
    pub check: Service,
    pub target: CheckTarget,
}

/// The outcome of a task that completed before the deadline. Tasks still
/// outstanding at the deadline produce nothing; the presumed-guilty result
/// table keeps their entries `false`.
#[derive(Debug)]
pub struct TaskResult {
    pub team: u8,
    pub service: String,
    pub passed: bool,
    pub message: String,
}

/// Dispatches all tasks concurrently under one deadline measured from now.
/// Stragglers get a best-effort abort and are never waited on; a late
/// result belongs to a round that has already been tabulated and is
/// discarded along with the set. No retries happen in here.
pub async fn run(tasks: Vec<CheckTask>, deadline: Duration) -> Vec<TaskResult> {
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(async move {
            let outcome = task.check.check(&task.target).await;
            TaskResult {
                team: task.team,
                service: task.service,
                passed: outcome.passed,
                message: outcome.message,
            }
        });
    }

    let deadline = tokio::time::Instant::now() + deadline;
    let mut results = Vec::with_capacity(set.len());
    while !set.is_empty() {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(result))) => results.push(result),
            Ok(Some(Err(error))) => {
                // A panicked check stays presumed guilty.
                warn! {
                    ?error,
                    "check task did not complete"
                }
            }
            Ok(None) => break,
            Err(_) => {
                debug!(
                    outstanding = set.len(),
                    "check deadline reached, abandoning outstanding checks"
                );
                set.abort_all();
                break;
            }
        }
    }
    results
}
