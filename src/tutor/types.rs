use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    pub learn_rate: f64,
    pub slip_rate: f64,
    pub guess_rate: f64,
}

impl BktParams {
    pub fn new(learn_rate: f64, slip_rate: f64, guess_rate: f64) -> Self {
        Self {
            learn_rate,
            slip_rate,
            guess_rate,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.learn_rate.is_finite() && self.slip_rate.is_finite() && self.guess_rate.is_finite()
    }
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            learn_rate: 0.15,
            slip_rate: 0.10,
            guess_rate: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryState {
    pub student_id: String,
    pub concept_id: String,
    pub mastery_probability: f64,
    pub practice_count: u32,
}

impl MasteryState {
    pub fn new(student_id: &str, concept_id: &str, mastery_probability: f64) -> Self {
        Self {
            student_id: student_id.to_string(),
            concept_id: concept_id.to_string(),
            mastery_probability: mastery_probability.clamp(0.0, 1.0),
            practice_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    pub fn all() -> &'static [BloomLevel] {
        &[
            Self::Remember,
            Self::Understand,
            Self::Apply,
            Self::Analyze,
            Self::Evaluate,
            Self::Create,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Understand => "understand",
            Self::Apply => "apply",
            Self::Analyze => "analyze",
            Self::Evaluate => "evaluate",
            Self::Create => "create",
        }
    }

    /// Unknown labels map to `None` so callers skip the guess adjustment.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "remember" => Some(Self::Remember),
            "understand" => Some(Self::Understand),
            "apply" => Some(Self::Apply),
            "analyze" | "analyse" => Some(Self::Analyze),
            "evaluate" => Some(Self::Evaluate),
            "create" => Some(Self::Create),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMetadata {
    pub question_id: String,
    pub difficulty_calibrated: Option<f64>,
    pub bloom_level: Option<BloomLevel>,
    pub estimated_time_seconds: f64,
    #[serde(default)]
    pub required_process_skills: BTreeSet<String>,
}

impl QuestionMetadata {
    pub fn new(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            difficulty_calibrated: None,
            bloom_level: None,
            estimated_time_seconds: 60.0,
            required_process_skills: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub student_id: String,
    pub concept_id: String,
    pub question_id: String,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}

/// Raw question record as handed over by the question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question_id: String,
    pub topic: String,
    pub difficulty: f64,
    pub estimated_time_ms: f64,
    pub correct_score: f64,
    pub incorrect_score: f64,
    #[serde(default)]
    pub mastery_for_topic: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub difficulty: f64,
    pub mastery_before: f64,
    pub mastery_after: f64,
    pub time_pressure: f64,
    pub fatigue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAssessment {
    pub intrinsic_load: f64,
    pub extraneous_load: f64,
    pub germane_load: f64,
    pub total_load: f64,
    pub capacity: f64,
    pub overload_risk: f64,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub fallback: bool,
}

impl LoadAssessment {
    /// Neutral assessment used when the assessor is unavailable.
    pub fn fallback() -> Self {
        Self {
            intrinsic_load: 0.5,
            extraneous_load: 0.0,
            germane_load: 0.0,
            total_load: 0.5,
            capacity: 1.0,
            overload_risk: 0.0,
            recommendations: Vec::new(),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(BloomLevel::parse("Create"), Some(BloomLevel::Create));
        assert_eq!(BloomLevel::parse(" ANALYSE "), Some(BloomLevel::Analyze));
        assert_eq!(BloomLevel::parse("synthesize"), None);
        for level in BloomLevel::all() {
            assert_eq!(BloomLevel::parse(level.as_str()), Some(*level));
        }
    }

    #[test]
    fn mastery_state_clamps_probability() {
        let state = MasteryState::new("s1", "c1", 1.7);
        assert_eq!(state.mastery_probability, 1.0);
        assert_eq!(state.practice_count, 0);
    }

    #[test]
    fn bloom_level_serializes_lowercase() {
        let json = serde_json::to_string(&BloomLevel::Evaluate).unwrap();
        assert_eq!(json, "\"evaluate\"");
    }
}
