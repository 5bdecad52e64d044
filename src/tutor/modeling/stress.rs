use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::tutor::config::StressConfig;
use crate::tutor::modeling::trend::variance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StressTier {
    #[default]
    None,
    Mild,
    Moderate,
    High,
}

impl StressTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Moderate
        } else if score >= 0.2 {
            Self::Mild
        } else {
            Self::None
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        let items: &[&str] = match self {
            Self::None => &[],
            Self::Mild => &["Offer a brief encouragement before the next item"],
            Self::Moderate => &[
                "Extend the time allowance for the next item",
                "Prefer a familiar question type",
            ],
            Self::High => &[
                "Suggest a short breathing break",
                "Drop to an easier item in the same topic",
                "Hide the countdown timer",
            ],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StressObservation {
    pub response_time_ms: f64,
    pub is_correct: bool,
    pub hesitation_ms: Option<f64>,
    pub keystroke_deviation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressIndicators {
    pub rt_variance_ratio: f64,
    pub error_streak: u32,
    pub hesitation_ms: Option<f64>,
    pub keystroke_deviation: Option<f64>,
    pub fatigue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressAssessment {
    pub stress_level: f64,
    pub tier: StressTier,
    pub confidence: f64,
    pub indicators: StressIndicators,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct LearnerWindow {
    response_times: VecDeque<f64>,
    correctness: VecDeque<bool>,
    last_seen: u64,
}

pub struct StressDetector {
    config: StressConfig,
    windows: HashMap<String, LearnerWindow>,
    tick: u64,
}

impl StressDetector {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            tick: 0,
        }
    }

    pub fn observe(&mut self, learner_id: &str, observation: StressObservation) -> StressAssessment {
        self.tick += 1;
        if !self.windows.contains_key(learner_id) && self.windows.len() >= self.config.max_learners.max(1) {
            self.evict_oldest();
        }
        let size = self.config.window_size.max(2);
        let window = self.windows.entry(learner_id.to_string()).or_default();
        window.last_seen = self.tick;

        let rt = if observation.response_time_ms.is_finite() {
            observation.response_time_ms.max(0.0)
        } else {
            0.0
        };
        window.response_times.push_back(rt);
        window.correctness.push_back(observation.is_correct);
        while window.response_times.len() > size {
            window.response_times.pop_front();
        }
        while window.correctness.len() > size {
            window.correctness.pop_front();
        }

        let indicators = StressIndicators {
            rt_variance_ratio: variance_ratio(&window.response_times, self.config.variance_floor),
            error_streak: trailing_errors(&window.correctness),
            hesitation_ms: observation.hesitation_ms.filter(|h| h.is_finite()),
            keystroke_deviation: observation.keystroke_deviation.filter(|k| k.is_finite()),
            fatigue: window.response_times.len() as f64 / size as f64,
        };
        assess(indicators)
    }

    pub fn reset(&mut self, learner_id: &str) {
        self.windows.remove(learner_id);
    }

    pub fn tracked_learners(&self) -> usize {
        self.windows.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .windows
            .iter()
            .min_by_key(|(_, w)| w.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.windows.remove(&id);
        }
    }
}

impl Default for StressDetector {
    fn default() -> Self {
        Self::new(StressConfig::default())
    }
}

fn variance_ratio(times: &VecDeque<f64>, floor: f64) -> f64 {
    if times.len() < 3 {
        return 1.0;
    }
    let current = variance(times.iter());
    let previous = variance(times.iter().take(times.len() - 1));
    current / previous.max(floor)
}

fn trailing_errors(correctness: &VecDeque<bool>) -> u32 {
    correctness.iter().rev().take_while(|c| !**c).count() as u32
}

fn assess(indicators: StressIndicators) -> StressAssessment {
    let mut score = 0.0;

    let ratio = indicators.rt_variance_ratio;
    score += if ratio > 3.0 {
        0.40
    } else if ratio > 2.0 {
        0.30
    } else if ratio > 1.5 {
        0.15
    } else {
        0.0
    };

    score += if indicators.error_streak >= 5 {
        0.30
    } else if indicators.error_streak >= 3 {
        0.15
    } else {
        0.0
    };

    if let Some(h) = indicators.hesitation_ms {
        score += if h > 10_000.0 {
            0.20
        } else if h > 5_000.0 {
            0.10
        } else {
            0.0
        };
    }

    if indicators.keystroke_deviation.is_some_and(|k| k > 0.5) {
        score += 0.10;
    }

    if indicators.fatigue >= 0.8 {
        score += 0.10;
    }

    let stress_level = f64::min(score, 1.0);
    let tier = StressTier::from_score(stress_level);
    StressAssessment {
        stress_level,
        tier,
        confidence: indicators.fatigue.clamp(0.0, 1.0),
        recommendations: tier.recommendations(),
        indicators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(rt: f64, correct: bool) -> StressObservation {
        StressObservation {
            response_time_ms: rt,
            is_correct: correct,
            ..Default::default()
        }
    }

    #[test]
    fn calm_learner_has_no_stress() {
        let mut detector = StressDetector::default();
        let mut last = StressAssessment::default();
        for _ in 0..4 {
            last = detector.observe("s1", obs(5000.0, true));
        }
        assert_eq!(last.tier, StressTier::None);
        assert!((last.confidence - 0.4).abs() < 1e-12);
    }

    #[test]
    fn constant_times_do_not_divide_by_zero() {
        let mut detector = StressDetector::default();
        for _ in 0..5 {
            let a = detector.observe("s1", obs(3000.0, true));
            assert!(a.indicators.rt_variance_ratio.is_finite());
        }
    }

    #[test]
    fn erratic_errors_raise_stress() {
        let mut detector = StressDetector::default();
        for rt in [3000.0, 3100.0, 2900.0, 3000.0] {
            detector.observe("s1", obs(rt, false));
        }
        let assessment = detector.observe(
            "s1",
            StressObservation {
                response_time_ms: 25_000.0,
                is_correct: false,
                hesitation_ms: Some(12_000.0),
                keystroke_deviation: Some(0.8),
            },
        );
        assert_eq!(assessment.indicators.error_streak, 5);
        assert!(assessment.indicators.rt_variance_ratio > 3.0);
        assert!(assessment.stress_level >= 0.7);
        assert_eq!(assessment.tier, StressTier::High);
        assert!(!assessment.recommendations.is_empty());
    }

    #[test]
    fn score_is_capped() {
        let indicators = StressIndicators {
            rt_variance_ratio: 10.0,
            error_streak: 9,
            hesitation_ms: Some(20_000.0),
            keystroke_deviation: Some(0.9),
            fatigue: 1.0,
        };
        assert!(assess(indicators).stress_level <= 1.0);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(StressTier::from_score(0.7), StressTier::High);
        assert_eq!(StressTier::from_score(0.4), StressTier::Moderate);
        assert_eq!(StressTier::from_score(0.2), StressTier::Mild);
        assert_eq!(StressTier::from_score(0.19), StressTier::None);
    }

    #[test]
    fn learners_are_isolated() {
        let mut detector = StressDetector::default();
        for _ in 0..5 {
            detector.observe("a", obs(3000.0, false));
        }
        let fresh = detector.observe("b", obs(3000.0, true));
        assert_eq!(fresh.indicators.error_streak, 0);
        assert_eq!(detector.tracked_learners(), 2);
    }
}
