use serde::{Deserialize, Serialize};

use crate::tutor::config::ConstraintConfig;
use crate::tutor::types::BktParams;

/// Keeps strict inequalities strict after a clamp onto their ceiling.
const STRICT_GAP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Learn,
    Slip,
    Guess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum ConstraintViolation {
    OutOfBounds {
        parameter: ParameterKind,
        value: f64,
        min: f64,
        max: f64,
    },
    Identifiability {
        guess_plus_slip: f64,
        limit: f64,
    },
    PerformanceOrdering {
        mastered_correct: f64,
        guess_plus_margin: f64,
    },
    TransitionRate {
        learn: f64,
        limit: f64,
    },
}

impl ConstraintViolation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "out_of_bounds",
            Self::Identifiability { .. } => "identifiability",
            Self::PerformanceOrdering { .. } => "performance_ordering",
            Self::TransitionRate { .. } => "transition_rate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub violations: Vec<ConstraintViolation>,
    pub corrected: BktParams,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterConstraintValidator {
    config: ConstraintConfig,
}

impl ParameterConstraintValidator {
    pub fn new(config: ConstraintConfig) -> Self {
        Self { config }
    }

    pub fn margin(&self) -> f64 {
        self.config.margin
    }

    pub fn validate(&self, params: &BktParams) -> ValidationReport {
        let violations = self.violations(params);
        ValidationReport {
            is_valid: violations.is_empty(),
            violations,
            corrected: self.project(params),
        }
    }

    fn violations(&self, params: &BktParams) -> Vec<ConstraintViolation> {
        let margin = self.config.margin;
        let mut violations = Vec::new();

        let boxes = [
            (ParameterKind::Learn, params.learn_rate, self.config.learn_bounds),
            (ParameterKind::Slip, params.slip_rate, self.config.slip_bounds),
            (ParameterKind::Guess, params.guess_rate, self.config.guess_bounds),
        ];
        for (parameter, value, (min, max)) in boxes {
            if !(value >= min && value <= max) {
                violations.push(ConstraintViolation::OutOfBounds {
                    parameter,
                    value,
                    min,
                    max,
                });
            }
        }

        let s = params.slip_rate;
        let g = params.guess_rate;
        let t = params.learn_rate;

        let limit = 1.0 - margin;
        if !(g + s < limit) {
            violations.push(ConstraintViolation::Identifiability {
                guess_plus_slip: g + s,
                limit,
            });
        }

        if !(1.0 - s > g + margin) {
            violations.push(ConstraintViolation::PerformanceOrdering {
                mastered_correct: 1.0 - s,
                guess_plus_margin: g + margin,
            });
        }

        let transition_limit = transition_ceiling(s, g, margin);
        if !(t < transition_limit) {
            violations.push(ConstraintViolation::TransitionRate {
                learn: t,
                limit: transition_limit,
            });
        }

        violations
    }

    /// Projects onto the feasible region; each step feeds the next because
    /// shrinking slip/guess moves the ceiling for the learn rate.
    pub fn project(&self, params: &BktParams) -> BktParams {
        let margin = self.config.margin;
        let defaults = BktParams::default();

        let (t_min, t_max) = self.config.learn_bounds;
        let (s_min, s_max) = self.config.slip_bounds;
        let (g_min, g_max) = self.config.guess_bounds;

        let mut t = finite_or(params.learn_rate, defaults.learn_rate).clamp(t_min, t_max);
        let mut s = finite_or(params.slip_rate, defaults.slip_rate).clamp(s_min, s_max);
        let mut g = finite_or(params.guess_rate, defaults.guess_rate).clamp(g_min, g_max);

        let budget = 1.0 - margin;
        if g + s >= budget {
            let scale = (budget - STRICT_GAP) / (g + s);
            s = (s * scale).max(s_min);
            g = (g * scale).max(g_min);
        }

        let guess_ceiling = 1.0 - s - margin;
        if g >= guess_ceiling {
            g = (guess_ceiling - STRICT_GAP).max(g_min);
        }

        let learn_ceiling = transition_ceiling(s, g, margin);
        if t >= learn_ceiling {
            t = (learn_ceiling - STRICT_GAP).max(t_min);
        }

        BktParams::new(t, s, g)
    }

    /// Validates and projects in one pass, logging any correction.
    pub fn enforce(&self, params: &BktParams, context: &str) -> (BktParams, Vec<ConstraintViolation>) {
        let report = self.validate(params);
        if !report.is_valid {
            let labels: Vec<&str> = report.violations.iter().map(|v| v.label()).collect();
            tracing::warn!(
                context,
                violations = ?labels,
                learn = report.corrected.learn_rate,
                slip = report.corrected.slip_rate,
                guess = report.corrected.guess_rate,
                "projected infeasible BKT parameters"
            );
        }
        (report.corrected, report.violations)
    }
}

fn transition_ceiling(slip: f64, guess: f64, margin: f64) -> f64 {
    let denom = (1.0 - guess).max(f64::EPSILON);
    (1.0 - slip) / denom - margin
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
