use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tutor::config::SpacedRepetitionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub half_life_hours: f64,
    pub last_review: DateTime<Utc>,
    pub next_review: Option<DateTime<Utc>>,
    pub guarded: bool,
}

/// Half-life regression: `h = exp(alpha * difficulty + beta * ability)`.
///
/// The model applies no clamping; see [`HalfLifeRegression::schedule_guarded`].
#[derive(Debug, Clone)]
pub struct HalfLifeRegression {
    alpha: f64,
    beta: f64,
}

impl HalfLifeRegression {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    pub fn from_config(config: &SpacedRepetitionConfig) -> Self {
        Self::new(config.alpha, config.beta)
    }

    pub fn half_life_hours(&self, difficulty: f64, ability: f64) -> f64 {
        (self.alpha * difficulty + self.beta * ability).exp()
    }

    pub fn next_review(&self, last_review: DateTime<Utc>, half_life_hours: f64) -> Option<DateTime<Utc>> {
        if !half_life_hours.is_finite() {
            return None;
        }
        let millis = half_life_hours * 3_600_000.0;
        if millis.abs() > i64::MAX as f64 / 2.0 {
            return None;
        }
        let delta = Duration::try_milliseconds(millis.round() as i64)?;
        last_review.checked_add_signed(delta)
    }

    pub fn schedule(&self, difficulty: f64, ability: f64, last_review: DateTime<Utc>) -> ReviewSchedule {
        let half_life_hours = self.half_life_hours(difficulty, ability);
        ReviewSchedule {
            half_life_hours,
            last_review,
            next_review: self.next_review(last_review, half_life_hours),
            guarded: false,
        }
    }

    /// Caps the scheduled review when the regression yields a pathological
    /// half-life; the raw half-life is still reported.
    pub fn schedule_guarded(
        &self,
        difficulty: f64,
        ability: f64,
        last_review: DateTime<Utc>,
        max_half_life_hours: f64,
    ) -> ReviewSchedule {
        let mut schedule = self.schedule(difficulty, ability, last_review);
        let h = schedule.half_life_hours;
        if !h.is_finite() || h > max_half_life_hours {
            tracing::warn!(
                half_life_hours = h,
                difficulty,
                ability,
                "half-life outside guard band, capping next review"
            );
            schedule.next_review = self.next_review(last_review, max_half_life_hours);
            schedule.guarded = true;
        }
        schedule
    }
}

impl Default for HalfLifeRegression {
    fn default() -> Self {
        Self::from_config(&SpacedRepetitionConfig::default())
    }
}
