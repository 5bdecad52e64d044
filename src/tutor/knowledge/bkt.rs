//! Bayesian Knowledge Tracing math core.
//!
//! Every function here is total: inputs are clamped, non-finite values are
//! replaced, and a vanishing evidence term falls back to the prior. A
//! degenerate update skips the learning transition too, so `new_mastery`
//! equals the floored prior.

use serde::{Deserialize, Serialize};

use crate::tutor::types::BktParams;

pub const PROB_FLOOR: f64 = 1e-9;
const NEUTRAL_MASTERY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktExplanation {
    pub slip_used: f64,
    pub guess_used: f64,
    pub learn_used: f64,
    pub numerator: f64,
    pub denominator: f64,
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktUpdate {
    pub previous_mastery: f64,
    pub posterior: f64,
    pub new_mastery: f64,
    pub predicted_correctness: f64,
    pub explanation: BktExplanation,
}

fn unit(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn bounded(value: f64) -> f64 {
    value.clamp(PROB_FLOOR, 1.0 - PROB_FLOOR)
}

pub fn predict_correctness(mastery: f64, slip: f64, guess: f64) -> f64 {
    let m = unit(mastery, NEUTRAL_MASTERY);
    let s = unit(slip, 0.0);
    let g = unit(guess, 0.0);
    m * (1.0 - s) + (1.0 - m) * g
}

fn posterior_terms(mastery: f64, correct: bool, params: &BktParams) -> (f64, f64, f64, bool) {
    let m = unit(mastery, NEUTRAL_MASTERY);
    let s = unit(params.slip_rate, 0.0);
    let g = unit(params.guess_rate, 0.0);

    let (numerator, denominator) = if correct {
        let num = m * (1.0 - s);
        (num, num + (1.0 - m) * g)
    } else {
        let num = m * s;
        (num, num + (1.0 - m) * (1.0 - g))
    };

    if denominator < PROB_FLOOR {
        return (bounded(m), numerator, PROB_FLOOR, true);
    }
    (bounded(numerator / denominator), numerator, denominator, false)
}

pub fn posterior(mastery: f64, correct: bool, params: &BktParams) -> f64 {
    posterior_terms(mastery, correct, params).0
}

pub fn transition(posterior: f64, learn_rate: f64) -> f64 {
    let p = unit(posterior, NEUTRAL_MASTERY);
    let t = unit(learn_rate, 0.0);
    bounded(p + (1.0 - p) * t)
}

pub fn update(mastery: f64, correct: bool, params: &BktParams) -> BktUpdate {
    let previous = unit(mastery, NEUTRAL_MASTERY);
    let predicted = predict_correctness(previous, params.slip_rate, params.guess_rate);
    let (post, numerator, denominator, degenerate) = posterior_terms(previous, correct, params);
    let learn = unit(params.learn_rate, 0.0);
    let new_mastery = if degenerate {
        tracing::debug!(mastery = previous, correct, "degenerate BKT evidence, keeping prior");
        post
    } else {
        transition(post, learn)
    };

    BktUpdate {
        previous_mastery: previous,
        posterior: post,
        new_mastery,
        predicted_correctness: predicted,
        explanation: BktExplanation {
            slip_used: unit(params.slip_rate, 0.0),
            guess_used: unit(params.guess_rate, 0.0),
            learn_used: learn,
            numerator,
            denominator,
            degenerate,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BktParams {
        BktParams::new(0.25, 0.1, 0.2)
    }

    #[test]
    fn predict_matches_closed_form() {
        let p = predict_correctness(0.4, 0.1, 0.2);
        assert!((p - (0.4 * 0.9 + 0.6 * 0.2)).abs() < 1e-12);
    }

    #[test]
    fn predict_clamps_out_of_range_inputs() {
        assert!((predict_correctness(2.0, -1.0, 0.3) - 1.0).abs() < 1e-12);
        assert!(predict_correctness(f64::NAN, 0.1, 0.2).is_finite());
    }

    #[test]
    fn posterior_rises_on_correct_and_falls_on_incorrect() {
        let up = posterior(0.4, true, &params());
        let down = posterior(0.4, false, &params());
        assert!(up > 0.4);
        assert!(down < 0.4);
    }

    #[test]
    fn posterior_at_certainty_stays_open_interval() {
        for m in [0.0, 1.0] {
            for correct in [true, false] {
                let p = posterior(m, correct, &params());
                assert!(p > 0.0 && p < 1.0, "m={m} correct={correct} p={p}");
                let t = transition(p, 0.25);
                assert!(t > 0.0 && t < 1.0);
            }
        }
    }

    #[test]
    fn degenerate_denominator_returns_prior() {
        // m = 0, guess = 0 makes the correct-branch evidence vanish.
        let degenerate = BktParams::new(0.1, 0.1, 0.0);
        let result = update(0.0, true, &degenerate);
        assert!(result.explanation.degenerate);
        assert_eq!(result.posterior, PROB_FLOOR);
        assert_eq!(result.new_mastery, PROB_FLOOR);

        // Certain mastery with zero slip leaves nothing to explain a miss.
        let certain = update(1.0, false, &BktParams::new(0.3, 0.0, 0.2));
        assert!(certain.explanation.degenerate);
        assert_eq!(certain.new_mastery, 1.0 - PROB_FLOOR);
    }

    #[test]
    fn update_reports_prediction_before_update() {
        let result = update(0.4, true, &params());
        assert!((result.predicted_correctness - predict_correctness(0.4, 0.1, 0.2)).abs() < 1e-12);
        assert_eq!(result.previous_mastery, 0.4);
        assert!(result.new_mastery >= result.posterior);
        assert_eq!(result.explanation.learn_used, 0.25);
    }

    #[test]
    fn two_correct_answers_increase_mastery_monotonically() {
        let first = update(0.4, true, &params());
        let second = update(first.new_mastery, true, &params());
        assert!(first.new_mastery > 0.4);
        assert!(second.new_mastery > first.new_mastery);
    }
}
