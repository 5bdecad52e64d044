use crate::tutor::config::CandidateConfig;
use crate::tutor::decision::linucb::BanditContext;
use crate::tutor::types::QuestionRecord;

/// Bandit feature layout. Feature 1 carries the item's estimated time in
/// minutes (`estimated_time_ms / 60_000`), not milliseconds.
pub const FEATURE_NAMES: [&str; 7] = [
    "difficulty",
    "estimated_time_minutes",
    "mastery_level",
    "stress_level",
    "cognitive_load",
    "correct_score",
    "incorrect_score",
];

pub const STRESS_FEATURE: usize = 3;
pub const LOAD_FEATURE: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct CandidateProvider {
    config: CandidateConfig,
}

impl CandidateProvider {
    pub fn new(config: CandidateConfig) -> Self {
        Self { config }
    }

    /// Drops hard items on weak topics unless that would leave nothing to pick.
    pub fn build(&self, records: &[QuestionRecord], stress: f64, load: f64) -> Vec<BanditContext> {
        let all: Vec<BanditContext> = records
            .iter()
            .map(|record| BanditContext::new(record.question_id.clone(), features(record, stress, load)))
            .collect();

        let gated: Vec<BanditContext> = records
            .iter()
            .zip(all.iter())
            .filter(|(record, _)| !self.is_gated(record))
            .map(|(_, ctx)| ctx.clone())
            .collect();

        if gated.is_empty() && !all.is_empty() {
            tracing::debug!(candidates = all.len(), "gating removed every candidate, using ungated set");
            return all;
        }
        gated
    }

    fn is_gated(&self, record: &QuestionRecord) -> bool {
        let mastery = record.mastery_for_topic.unwrap_or(0.0);
        mastery < self.config.mastery_gate && record.difficulty > self.config.difficulty_gate
    }
}

fn features(record: &QuestionRecord, stress: f64, load: f64) -> Vec<f64> {
    vec![
        finite_or_zero(record.difficulty),
        finite_or_zero(record.estimated_time_ms) / 60_000.0,
        finite_or_zero(record.mastery_for_topic.unwrap_or(0.0)),
        finite_or_zero(stress),
        finite_or_zero(load),
        finite_or_zero(record.correct_score),
        finite_or_zero(record.incorrect_score),
    ]
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
