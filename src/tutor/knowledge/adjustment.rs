use serde::{Deserialize, Serialize};

use crate::tutor::config::AdjustmentConfig;
use crate::tutor::knowledge::constraints::{ConstraintViolation, ParameterConstraintValidator};
use crate::tutor::types::{BktParams, BloomLevel, QuestionMetadata};

pub fn bloom_guess_delta(level: BloomLevel) -> f64 {
    match level {
        BloomLevel::Remember => -0.05,
        BloomLevel::Understand => -0.02,
        BloomLevel::Apply => 0.0,
        BloomLevel::Analyze => 0.03,
        BloomLevel::Evaluate => 0.05,
        BloomLevel::Create => 0.10,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentDeltas {
    pub difficulty_slip: f64,
    pub bloom_guess: f64,
    pub fast_response_guess: f64,
    pub slow_response_slip: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentAudit {
    pub base: BktParams,
    pub deltas: AdjustmentDeltas,
    pub modulated: BktParams,
    pub final_params: BktParams,
    pub violations: Vec<ConstraintViolation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustedParameters {
    pub params: BktParams,
    pub audit: AdjustmentAudit,
}

#[derive(Debug, Clone, Default)]
pub struct ContextualAdjuster {
    config: AdjustmentConfig,
    validator: ParameterConstraintValidator,
}

impl ContextualAdjuster {
    pub fn new(config: AdjustmentConfig, validator: ParameterConstraintValidator) -> Self {
        Self { config, validator }
    }

    pub fn adjust(
        &self,
        base: &BktParams,
        metadata: Option<&QuestionMetadata>,
        response_time_ms: Option<i64>,
    ) -> AdjustedParameters {
        let mut deltas = AdjustmentDeltas::default();

        if let Some(meta) = metadata {
            if let Some(difficulty) = meta.difficulty_calibrated.filter(|d| d.is_finite()) {
                deltas.difficulty_slip = self.config.difficulty_slip_weight * difficulty.max(0.0);
            }
            if let Some(level) = meta.bloom_level {
                deltas.bloom_guess = bloom_guess_delta(level);
            }
        }

        if let Some(rt) = response_time_ms {
            if rt < self.config.fast_response_ms {
                deltas.fast_response_guess = self.config.fast_response_guess_delta;
            } else if rt > self.config.slow_response_ms {
                deltas.slow_response_slip = self.config.slow_response_slip_delta;
            }
        }

        let (t_min, t_max) = self.config.learn_bounds;
        let (s_min, s_max) = self.config.slip_bounds;
        let (g_min, g_max) = self.config.guess_bounds;
        let modulated = BktParams::new(
            base.learn_rate.clamp(t_min, t_max),
            (base.slip_rate + deltas.difficulty_slip + deltas.slow_response_slip).clamp(s_min, s_max),
            (base.guess_rate + deltas.bloom_guess + deltas.fast_response_guess).clamp(g_min, g_max),
        );

        let (final_params, violations) = self.validator.enforce(&modulated, "contextual_adjustment");

        AdjustedParameters {
            params: final_params,
            audit: AdjustmentAudit {
                base: *base,
                deltas,
                modulated,
                final_params,
                violations,
            },
        }
    }
}
