// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! Per-team scoring state: raw points per category, penalties, and the SLA
//! violation streak tracker. The total is always derived, never stored.

use dommer_common::models::{InjectReport, Settings};
use std::collections::BTreeMap;
use tracing::debug;

/// One team's mutable score ledger. Categories are `box.service` names,
/// `inject<N>`, or (on the penalty side) `sla-<service>`.
#[derive(Debug, Clone)]
pub struct TeamLedger {
    pub name: String,
    pub identifier: u8,
    raw: BTreeMap<String, f64>,
    penalty: BTreeMap<String, f64>,
    sla_streak: BTreeMap<String, u32>,
}

/// What one tabulation produced: the derived total plus the services whose
/// failure streak just turned into an SLA violation this round.
#[derive(Debug)]
pub struct Tabulation {
    pub total: f64,
    pub sla_violations: Vec<String>,
}

impl TeamLedger {
    pub fn new(name: impl Into<String>, identifier: u8) -> Self {
        TeamLedger {
            name: name.into(),
            identifier,
            raw: BTreeMap::new(),
            penalty: BTreeMap::new(),
            sla_streak: BTreeMap::new(),
        }
    }

    /// Adds points to a raw category, creating it if absent so dynamically
    /// reconfigured services need no pre-registration.
    pub fn award(&mut self, category: &str, points: f64) {
        *self.raw.entry(category.to_string()).or_insert(0.0) += points;
    }

    /// The derived total: `sum(raw) - sum(penalty)`.
    pub fn total(&self) -> f64 {
        self.raw.values().sum::<f64>() - self.penalty.values().sum::<f64>()
    }

    pub fn raw_score(&self, category: &str) -> f64 {
        self.raw.get(category).copied().unwrap_or(0.0)
    }

    pub fn penalty_score(&self, category: &str) -> f64 {
        self.penalty.get(category).copied().unwrap_or(0.0)
    }

    pub fn sla_streak(&self, service: &str) -> u32 {
        self.sla_streak.get(service).copied().unwrap_or(0)
    }

    /// Folds one round's check results and the team's graded injects into
    /// the ledger. Kept pure over in-memory state; the caller persists the
    /// resulting reports and total.
    pub fn tabulate(
        &mut self,
        round: u32,
        settings: &Settings,
        results: &BTreeMap<String, (bool, String)>,
        injects: &[InjectReport],
    ) -> Tabulation {
        let mut sla_violations = Vec::new();

        for (service, (passed, _message)) in results {
            if *passed {
                self.award(service, settings.check_points);
                self.sla_streak.insert(service.clone(), 0);
                continue;
            }
            let streak = self.sla_streak.entry(service.clone()).or_insert(0);
            if *streak + 1 >= settings.sla_requirement {
                // The streak hit the requirement: exactly one penalty, then
                // a fresh streak.
                *self
                    .penalty
                    .entry(format!("sla-{service}"))
                    .or_insert(0.0) += settings.sla_penalty;
                *streak = 0;
                sla_violations.push(service.clone());
                debug!(
                    team = self.identifier,
                    service, round, "sla violation recorded"
                );
            } else {
                *streak += 1;
            }
        }

        // Inject scores overwrite their category, so re-applying an
        // already-tabulated grade is a no-op.
        for report in injects {
            self.raw
                .insert(format!("inject{}", report.inject), report.score);
        }

        Tabulation {
            total: self.total(),
            sla_violations,
        }
    }

    /// Renders the ledger as a CSV score breakdown: a `total` row followed
    /// by one row per category.
    pub fn export_csv(&self) -> String {
        // summing an empty map yields -0.0, which would render as "-0"
        let raw_total = self.raw.values().sum::<f64>() + 0.0;
        let penalty_total = self.penalty.values().sum::<f64>() + 0.0;

        let mut out = String::from("point_category,raw_points,penalty_points,total_points\n");
        out.push_str(&format!(
            "total,{raw_total},{penalty_total},{}\n",
            raw_total - penalty_total
        ));
        for (category, points) in &self.raw {
            let penalty = self.penalty_score(&format!("sla-{category}"));
            out.push_str(&format!(
                "{category},{points},{penalty},{}\n",
                points - penalty
            ));
        }
        out
    }
}
