use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::tutor::config::FairnessConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairnessRecommendation {
    InvestigateBias,
    Acceptable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairnessReport {
    pub exam_id: String,
    pub subject_id: String,
    pub group_averages: BTreeMap<String, f64>,
    pub disparity: f64,
    pub recommendation: FairnessRecommendation,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupStats {
    sum: f64,
    count: u64,
}

type GroupKey = (String, String, String);

#[derive(Default)]
pub struct FairnessMonitor {
    config: FairnessConfig,
    stats: RwLock<HashMap<GroupKey, GroupStats>>,
}

impl FairnessMonitor {
    pub fn new(config: FairnessConfig) -> Self {
        Self {
            config,
            stats: RwLock::new(HashMap::new()),
        }
    }

    pub fn record(&self, exam_id: &str, subject_id: &str, group: &str, mastery: f64) {
        if !mastery.is_finite() {
            tracing::debug!(exam_id, subject_id, group, "skipping non-finite mastery sample");
            return;
        }
        let mut stats = self.stats.write();
        let entry = stats
            .entry((exam_id.to_string(), subject_id.to_string(), group.to_string()))
            .or_default();
        entry.sum += mastery.clamp(0.0, 1.0);
        entry.count += 1;
    }

    /// `None` until at least two groups have samples for the pair.
    pub fn report(&self, exam_id: &str, subject_id: &str) -> Option<FairnessReport> {
        let stats = self.stats.read();
        let mut group_averages = BTreeMap::new();
        let mut sample_count = 0;
        for ((exam, subject, group), s) in stats.iter() {
            if exam == exam_id && subject == subject_id && s.count > 0 {
                group_averages.insert(group.clone(), s.sum / s.count as f64);
                sample_count += s.count;
            }
        }
        if group_averages.len() < 2 {
            return None;
        }

        let max = group_averages.values().copied().fold(f64::MIN, f64::max);
        let min = group_averages.values().copied().fold(f64::MAX, f64::min);
        let disparity = max - min;
        let recommendation = if disparity > self.config.disparity_threshold {
            tracing::warn!(exam_id, subject_id, disparity, "mastery disparity across groups");
            FairnessRecommendation::InvestigateBias
        } else {
            FairnessRecommendation::Acceptable
        };

        Some(FairnessReport {
            exam_id: exam_id.to_string(),
            subject_id: subject_id.to_string(),
            group_averages,
            disparity,
            recommendation,
            sample_count,
        })
    }
}
