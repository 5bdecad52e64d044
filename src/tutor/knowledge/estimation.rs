//! Offline BKT parameter fitting by grid search over the log-likelihood.

use serde::{Deserialize, Serialize};

use crate::tutor::error::EstimationError;
use crate::tutor::knowledge::bkt::{self, PROB_FLOOR};
use crate::tutor::knowledge::constraints::ParameterConstraintValidator;
use crate::tutor::types::BktParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationGrid {
    pub learn: Vec<f64>,
    pub slip: Vec<f64>,
    pub guess: Vec<f64>,
}

impl EstimationGrid {
    pub fn uniform(steps: usize) -> Self {
        let steps = steps.max(2);
        let axis = |lo: f64, hi: f64| -> Vec<f64> {
            (0..steps)
                .map(|i| lo + (hi - lo) * i as f64 / (steps - 1) as f64)
                .collect()
        };
        Self {
            learn: axis(0.01, 0.5),
            slip: axis(0.01, 0.3),
            guess: axis(0.01, 0.5),
        }
    }
}

impl Default for EstimationGrid {
    fn default() -> Self {
        Self::uniform(10)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationResult {
    pub params: BktParams,
    pub log_likelihood: f64,
    pub observations: usize,
}

pub fn log_likelihood(sequences: &[Vec<bool>], prior: f64, params: &BktParams) -> f64 {
    let mut total = 0.0;
    for sequence in sequences {
        let mut mastery = prior;
        for &correct in sequence {
            let p = bkt::predict_correctness(mastery, params.slip_rate, params.guess_rate)
                .clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
            total += if correct { p.ln() } else { (1.0 - p).ln() };
            mastery = bkt::update(mastery, correct, params).new_mastery;
        }
    }
    total
}

pub fn estimate_parameters(
    sequences: &[Vec<bool>],
    prior: f64,
    grid: &EstimationGrid,
    validator: &ParameterConstraintValidator,
) -> Result<EstimationResult, EstimationError> {
    let observations: usize = sequences.iter().map(Vec::len).sum();
    if observations == 0 {
        return Err(EstimationError::EmptyInput);
    }
    if grid.learn.is_empty() || grid.slip.is_empty() || grid.guess.is_empty() {
        return Err(EstimationError::InvalidGrid("every axis needs at least one value".into()));
    }

    let mut best: Option<EstimationResult> = None;
    for &learn in &grid.learn {
        for &slip in &grid.slip {
            for &guess in &grid.guess {
                let candidate = validator.project(&BktParams::new(learn, slip, guess));
                let ll = log_likelihood(sequences, prior, &candidate);
                if !ll.is_finite() {
                    continue;
                }
                let better = best.as_ref().map_or(true, |b| ll > b.log_likelihood);
                if better {
                    best = Some(EstimationResult {
                        params: candidate,
                        log_likelihood: ll,
                        observations,
                    });
                }
            }
        }
    }

    let result = best.ok_or_else(|| EstimationError::InvalidGrid("no finite likelihood on grid".into()))?;
    tracing::info!(
        learn = result.params.learn_rate,
        slip = result.params.slip_rate,
        guess = result.params.guess_rate,
        log_likelihood = result.log_likelihood,
        observations,
        "estimated BKT parameters"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        let err = estimate_parameters(&[], 0.3, &EstimationGrid::default(), &ParameterConstraintValidator::default());
        assert_eq!(err, Err(EstimationError::EmptyInput));
    }

    #[test]
    fn fitted_params_are_feasible() {
        let sequences = vec![
            vec![false, false, true, true, true, true],
            vec![false, true, true, true, true],
            vec![true, false, true, true, true, true, true],
        ];
        let validator = ParameterConstraintValidator::default();
        let result = estimate_parameters(&sequences, 0.3, &EstimationGrid::uniform(6), &validator).unwrap();
        assert!(validator.validate(&result.params).is_valid);
        assert_eq!(result.observations, 18);
        assert!(result.log_likelihood < 0.0);
    }

    #[test]
    fn fit_beats_arbitrary_point() {
        let sequences = vec![vec![true; 8], vec![true, true, false, true, true, true]];
        let validator = ParameterConstraintValidator::default();
        let result = estimate_parameters(&sequences, 0.3, &EstimationGrid::uniform(5), &validator).unwrap();
        let arbitrary = log_likelihood(&sequences, 0.3, &BktParams::new(0.01, 0.3, 0.01));
        assert!(result.log_likelihood >= arbitrary);
    }
}
