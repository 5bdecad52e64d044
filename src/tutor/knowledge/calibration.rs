use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::tutor::knowledge::bkt::PROB_FLOOR;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationReport {
    pub samples: usize,
    pub brier_score: f64,
    pub log_loss: f64,
    pub auc: Option<f64>,
}

/// Bounded history of (predicted correctness, observed outcome) pairs.
#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    samples: VecDeque<(f64, bool)>,
    capacity: usize,
}

impl CalibrationTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, predicted: f64, correct: bool) {
        if !predicted.is_finite() {
            return;
        }
        self.samples.push_back((predicted.clamp(0.0, 1.0), correct));
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn report(&self) -> Option<CalibrationReport> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let brier = self
            .samples
            .iter()
            .map(|(p, y)| (p - if *y { 1.0 } else { 0.0 }).powi(2))
            .sum::<f64>()
            / n;
        let log_loss = -self
            .samples
            .iter()
            .map(|(p, y)| {
                let p = p.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
                if *y {
                    p.ln()
                } else {
                    (1.0 - p).ln()
                }
            })
            .sum::<f64>()
            / n;

        Some(CalibrationReport {
            samples: self.samples.len(),
            brier_score: brier,
            log_loss,
            auc: self.auc(),
        })
    }

    fn auc(&self) -> Option<f64> {
        let positives: Vec<f64> = self.samples.iter().filter(|(_, y)| *y).map(|(p, _)| *p).collect();
        let negatives: Vec<f64> = self.samples.iter().filter(|(_, y)| !*y).map(|(p, _)| *p).collect();
        if positives.is_empty() || negatives.is_empty() {
            return None;
        }
        let mut wins = 0.0;
        for pos in &positives {
            for neg in &negatives {
                if pos > neg {
                    wins += 1.0;
                } else if (pos - neg).abs() < f64::EPSILON {
                    wins += 0.5;
                }
            }
        }
        Some(wins / (positives.len() * negatives.len()) as f64)
    }
}

impl Default for CalibrationTracker {
    fn default() -> Self {
        Self::new(5000)
    }
}
