// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One rubric category: a weight (fraction of the inject's worth) and the
/// ordered tier labels a grader can pick from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RubricCategory {
    pub weight: f64,
    pub tiers: Vec<String>,
}

/// A manually graded exercise. The score breakdown is derived once at load
/// time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InjectRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub worth: f64,
    pub rubric: BTreeMap<String, RubricCategory>,
}

#[derive(thiserror::Error, Debug)]
pub enum InjectError {
    /// The tier-score formula divides by `tier_count - 1`; a single-tier
    /// category is undefined and is rejected when the inject is loaded.
    #[error("inject `{inject}` category `{category}` needs at least two tiers")]
    NotEnoughTiers { inject: String, category: String },
    #[error("inject `{inject}` category `{category}` has weight {weight}, expected (0, 1]")]
    InvalidWeight {
        inject: String,
        category: String,
        weight: f64,
    },
}

impl InjectRecord {
    /// Derives the per-category tier scores:
    /// `points(tier i) = worth * weight * i / (tier_count - 1)`.
    pub fn score_breakdown(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<String, f64>>, InjectError> {
        let mut breakdown = BTreeMap::new();
        for (category, rubric) in &self.rubric {
            if rubric.tiers.len() < 2 {
                return Err(InjectError::NotEnoughTiers {
                    inject: self.name.clone(),
                    category: category.clone(),
                });
            }
            if !(rubric.weight > 0.0 && rubric.weight <= 1.0) {
                return Err(InjectError::InvalidWeight {
                    inject: self.name.clone(),
                    category: category.clone(),
                    weight: rubric.weight,
                });
            }
            let step = self.worth * rubric.weight / (rubric.tiers.len() - 1) as f64;
            let tiers = rubric
                .tiers
                .iter()
                .enumerate()
                .map(|(i, label)| (label.clone(), step * i as f64))
                .collect();
            breakdown.insert(category.clone(), tiers);
        }
        Ok(breakdown)
    }
}
