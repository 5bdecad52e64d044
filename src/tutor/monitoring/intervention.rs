use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tutor::config::InterventionConfig;
use crate::tutor::modeling::trend::{regression_slope, TrendState};
use crate::tutor::types::PerformanceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterventionStrategy {
    Mild,
    Moderate,
    Strong,
    Critical,
}

impl InterventionStrategy {
    pub fn from_severity(points: u32) -> Self {
        match points {
            0..=3 => Self::Mild,
            4..=6 => Self::Moderate,
            7..=8 => Self::Strong,
            _ => Self::Critical,
        }
    }

    pub fn base_success_probability(&self) -> f64 {
        match self {
            Self::Mild => 0.70,
            Self::Moderate => 0.60,
            Self::Strong => 0.50,
            Self::Critical => 0.40,
        }
    }

    pub fn actions(&self) -> &'static [InterventionAction] {
        use InterventionAction::*;
        match self {
            Self::Mild => &[Encouragement, HintProvision],
            Self::Moderate => &[DifficultyReduction, HintProvision, ConceptReview],
            Self::Strong => &[DifficultyReduction, ConceptReview, WorkedExample, BreakSuggestion],
            Self::Critical => &[BreakSuggestion, ConceptReview, PrerequisiteReview, TutorReferral],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    Encouragement,
    HintProvision,
    DifficultyReduction,
    ConceptReview,
    WorkedExample,
    BreakSuggestion,
    PrerequisiteReview,
    TutorReferral,
}

impl InterventionAction {
    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Encouragement => "Acknowledge effort and restate the goal for this topic",
            Self::HintProvision => "Offer a stepwise hint on the next item",
            Self::DifficultyReduction => "Lower item difficulty until two answers in a row are correct",
            Self::ConceptReview => "Review the core concept before continuing",
            Self::WorkedExample => "Walk through a fully worked example",
            Self::BreakSuggestion => "Suggest a short break before the next item",
            Self::PrerequisiteReview => "Revisit prerequisite concepts for this topic",
            Self::TutorReferral => "Flag the learner for a human tutor check-in",
        }
    }

    /// Expected gain from this action given the metric it targets.
    fn impact(&self, metrics: &DeclineMetrics) -> f64 {
        match self {
            Self::Encouragement => 0.02,
            Self::HintProvision => 0.05 * (1.0 - metrics.accuracy),
            Self::DifficultyReduction => 0.05 * metrics.mean_time_pressure,
            Self::ConceptReview => 0.10 * (1.0 - metrics.accuracy),
            Self::WorkedExample => 0.05 * (metrics.consecutive_failures.min(5) as f64 / 5.0),
            Self::BreakSuggestion => 0.10 * metrics.mean_fatigue,
            Self::PrerequisiteReview => 0.05 * (-metrics.mastery_delta).clamp(0.0, 1.0),
            Self::TutorReferral => 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineMetrics {
    pub accuracy: f64,
    pub slope: f64,
    pub trend: TrendState,
    pub consecutive_failures: u32,
    pub mean_time_pressure: f64,
    pub mean_fatigue: f64,
    pub mastery_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionResult {
    pub id: Uuid,
    pub strategy: InterventionStrategy,
    pub level: u32,
    pub success_probability: f64,
    pub actions: Vec<InterventionAction>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub metrics: DeclineMetrics,
}

#[derive(Debug, Default)]
struct TopicState {
    records: VecDeque<PerformanceRecord>,
    last: Option<InterventionResult>,
    last_seen: u64,
}

type TopicKey = (String, String);

#[derive(Debug, Default)]
struct TopicTable {
    states: HashMap<TopicKey, TopicState>,
    tick: u64,
}

impl TopicTable {
    fn evict_if_full(&mut self, max_topics: usize) {
        if self.states.len() < max_topics.max(1) {
            return;
        }
        let oldest = self
            .states
            .iter()
            .min_by_key(|(_, s)| s.last_seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.states.remove(&key);
            tracing::debug!(student_id = %key.0, topic = %key.1, "evicted idle intervention window");
        }
    }
}

#[derive(Default)]
pub struct InterventionManager {
    config: InterventionConfig,
    topics: RwLock<TopicTable>,
}

impl InterventionManager {
    pub fn new(config: InterventionConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(TopicTable::default()),
        }
    }

    pub fn record(&self, student_id: &str, topic: &str, record: PerformanceRecord) {
        let cap = self.config.window_size.max(1) * 3;
        let key = (student_id.to_string(), topic.to_string());
        let mut table = self.topics.write();
        table.tick += 1;
        let tick = table.tick;
        if !table.states.contains_key(&key) {
            table.evict_if_full(self.config.max_topics);
        }
        let state = table.states.entry(key).or_default();
        state.last_seen = tick;
        state.records.push_back(record);
        while state.records.len() > cap {
            state.records.pop_front();
        }
    }

    pub fn history_len(&self, student_id: &str, topic: &str) -> usize {
        self.topics
            .read()
            .states
            .get(&(student_id.to_string(), topic.to_string()))
            .map_or(0, |s| s.records.len())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().states.len()
    }

    /// Inside the cooldown window the previous result is returned unchanged.
    pub fn evaluate(&self, student_id: &str, topic: &str, now: DateTime<Utc>) -> Option<InterventionResult> {
        let mut table = self.topics.write();
        let state = table.states.get_mut(&(student_id.to_string(), topic.to_string()))?;

        if let Some(last) = &state.last {
            if now - last.timestamp < Duration::seconds(self.config.cooldown_secs) {
                return Some(last.clone());
            }
        }

        let window_size = self.config.window_size.max(1);
        if state.records.len() < self.config.min_points {
            return None;
        }
        let skip = state.records.len().saturating_sub(window_size);
        let window: Vec<&PerformanceRecord> = state.records.iter().skip(skip).collect();

        let metrics = compute_metrics(&window, self.config.decline_slope);
        if !self.is_declining(&metrics) {
            return None;
        }

        let level = severity(&metrics);
        let strategy = InterventionStrategy::from_severity(level);
        let actions = strategy.actions().to_vec();
        let success_probability = (strategy.base_success_probability()
            + actions.iter().map(|a| a.impact(&metrics)).sum::<f64>())
        .clamp(0.1, 0.95);

        let result = InterventionResult {
            id: Uuid::new_v4(),
            strategy,
            level,
            success_probability,
            recommendations: actions.iter().map(|a| a.recommendation().to_string()).collect(),
            actions,
            timestamp: now,
            metrics,
        };
        tracing::info!(
            student_id,
            topic,
            strategy = ?result.strategy,
            level,
            "performance decline intervention issued"
        );
        state.last = Some(result.clone());
        Some(result)
    }

    fn is_declining(&self, m: &DeclineMetrics) -> bool {
        m.slope <= self.config.decline_slope
            || m.consecutive_failures >= self.config.failure_streak
            || (m.mastery_delta < 0.0 && m.accuracy < self.config.low_accuracy)
    }
}

fn compute_metrics(window: &[&PerformanceRecord], trend_threshold: f64) -> DeclineMetrics {
    let n = window.len().max(1) as f64;
    let correctness: Vec<f64> = window.iter().map(|r| if r.is_correct { 1.0 } else { 0.0 }).collect();
    let slope = regression_slope(&correctness);
    let consecutive_failures = window.iter().rev().take_while(|r| !r.is_correct).count() as u32;
    let mastery_delta = match (window.first(), window.last()) {
        (Some(first), Some(last)) => last.mastery_after - first.mastery_before,
        _ => 0.0,
    };

    DeclineMetrics {
        accuracy: correctness.iter().sum::<f64>() / n,
        slope,
        trend: TrendState::from_slope(slope, trend_threshold.abs()),
        consecutive_failures,
        mean_time_pressure: window.iter().map(|r| r.time_pressure).sum::<f64>() / n,
        mean_fatigue: window.iter().map(|r| r.fatigue).sum::<f64>() / n,
        mastery_delta,
    }
}

fn severity(m: &DeclineMetrics) -> u32 {
    let accuracy = if m.accuracy <= 0.2 {
        3
    } else if m.accuracy < 0.4 {
        2
    } else if m.accuracy < 0.6 {
        1
    } else {
        0
    };
    let slope = if m.slope <= -0.2 {
        3
    } else if m.slope <= -0.15 {
        2
    } else if m.slope <= -0.1 {
        1
    } else {
        0
    };
    let failures = match m.consecutive_failures {
        0 | 1 => 0,
        2 => 1,
        3 => 2,
        _ => 3,
    };
    accuracy + slope + failures + graded(m.mean_time_pressure) + graded(m.mean_fatigue)
}

fn graded(v: f64) -> u32 {
    if v >= 0.8 {
        3
    } else if v >= 0.6 {
        2
    } else if v >= 0.4 {
        1
    } else {
        0
    }
}
