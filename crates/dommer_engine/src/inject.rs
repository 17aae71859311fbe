// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

//! Grades injects against their rubric. Grading is independent of the
//! round loop; a grade surfaces as an InjectReport that the next
//! tabulation folds into the team ledger.

use dommer_common::models::{InjectError, InjectReport};
use dommer_common::stores::{InjectReportStore, InjectStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum GradeError {
    #[error("no inject with id {0}")]
    UnknownInject(u32),
    #[error("rubric error: {0}")]
    Rubric(#[from] InjectError),
    #[error("no rubric category named {0}")]
    UnknownCategory(String),
    #[error("no tier {tier} in rubric category {category}")]
    UnknownTier { category: String, tier: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub struct InjectGrader {
    injects: Arc<dyn InjectStore>,
    reports: Arc<dyn InjectReportStore>,
}

impl InjectGrader {
    pub fn new(injects: Arc<dyn InjectStore>, reports: Arc<dyn InjectReportStore>) -> Self {
        InjectGrader { injects, reports }
    }

    /// Scores a grader's tier selections against the inject's derived
    /// breakdown and persists the result. Re-grading overwrites the
    /// previous report for the same (team, inject) pair.
    pub async fn grade(
        &self,
        team: u8,
        inject: u32,
        selections: &BTreeMap<String, String>,
    ) -> Result<InjectReport, GradeError> {
        let record = self
            .injects
            .list_injects()
            .await?
            .into_iter()
            .find(|record| record.id == inject)
            .ok_or(GradeError::UnknownInject(inject))?;

        let breakdown = record.score_breakdown()?;
        let mut score = 0.0;
        for (category, tier) in selections {
            let tiers = breakdown
                .get(category)
                .ok_or_else(|| GradeError::UnknownCategory(category.clone()))?;
            score += tiers.get(tier).ok_or_else(|| GradeError::UnknownTier {
                category: category.clone(),
                tier: tier.clone(),
            })?;
        }

        let report = InjectReport {
            team,
            inject,
            score,
        };
        self.reports.upsert(report.clone()).await?;
        info!(team, inject, score, "inject graded");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dommer_common::config::AppConfig;
    use dommer_common::stores::memory::MemoryStores;

    fn stores() -> Arc<MemoryStores> {
        let config: AppConfig = toml::from_str(
            r#"
            [competition]
            name = "test"
            [competition.settings]
            first_octets = "10.100"

            [[injects]]
            id = 2
            name = "incident report"
            worth = 100.0
            [injects.rubric.clarity]
            weight = 0.5
            tiers = ["missing", "partial", "complete"]
            [injects.rubric.timeline]
            weight = 0.5
            tiers = ["missing", "complete"]
            "#,
        )
        .unwrap();
        MemoryStores::from_config(&config).unwrap()
    }

    fn grader(stores: &Arc<MemoryStores>) -> InjectGrader {
        InjectGrader::new(stores.clone(), stores.clone())
    }

    #[tokio::test]
    async fn should_sum_the_selected_tiers() {
        let stores = stores();
        let selections = BTreeMap::from([
            ("clarity".to_string(), "partial".to_string()),
            ("timeline".to_string(), "complete".to_string()),
        ]);
        let report = grader(&stores).grade(1, 2, &selections).await.unwrap();
        // clarity partial = 100 * 0.5 * 1/2 = 25, timeline complete = 50
        assert_eq!(report.score, 75.0);
        assert_eq!(stores.inject_report_for(1, 2).unwrap().score, 75.0);
    }

    #[tokio::test]
    async fn should_overwrite_on_regrade() {
        let stores = stores();
        let grader = grader(&stores);
        let first = BTreeMap::from([("clarity".to_string(), "missing".to_string())]);
        let second = BTreeMap::from([("clarity".to_string(), "complete".to_string())]);
        grader.grade(1, 2, &first).await.unwrap();
        grader.grade(1, 2, &second).await.unwrap();
        assert_eq!(stores.inject_report_for(1, 2).unwrap().score, 50.0);
    }

    #[tokio::test]
    async fn should_reject_unknown_injects_and_selections() {
        let stores = stores();
        let grader = grader(&stores);

        let missing = grader.grade(1, 9, &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(missing, GradeError::UnknownInject(9)));

        let selections = BTreeMap::from([("brevity".to_string(), "complete".to_string())]);
        let err = grader.grade(1, 2, &selections).await.unwrap_err();
        assert!(matches!(err, GradeError::UnknownCategory(_)));
    }
}
