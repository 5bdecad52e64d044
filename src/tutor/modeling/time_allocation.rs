use serde::{Deserialize, Serialize};

use crate::tutor::config::TimeAllocationConfig;
use crate::tutor::error::AllocationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAllocationInput {
    pub base_time_seconds: f64,
    pub stress: f64,
    pub fatigue: f64,
    pub mastery: f64,
    pub difficulty: f64,
    pub session_minutes: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeFactors {
    pub stress: f64,
    pub fatigue: f64,
    pub mastery: f64,
    pub difficulty: f64,
    pub session: f64,
}

impl TimeFactors {
    pub fn neutral() -> Self {
        Self {
            stress: 1.0,
            fatigue: 1.0,
            mastery: 1.0,
            difficulty: 1.0,
            session: 1.0,
        }
    }

    fn product(&self) -> f64 {
        self.stress * self.fatigue * self.mastery * self.difficulty * self.session
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAllocation {
    pub base_time_seconds: f64,
    pub allocated_time_seconds: f64,
    pub multiplier: f64,
    pub factors: TimeFactors,
    pub fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DynamicTimeAllocator {
    config: TimeAllocationConfig,
}

impl DynamicTimeAllocator {
    pub fn new(config: TimeAllocationConfig) -> Self {
        Self { config }
    }

    /// Never fails; any internal error yields the unmodified base time.
    pub fn allocate(&self, input: &TimeAllocationInput) -> TimeAllocation {
        match self.try_allocate(input) {
            Ok(allocation) => allocation,
            Err(err) => {
                tracing::warn!(error = %err, "time allocation failed, using base time");
                let base = if input.base_time_seconds.is_finite() && input.base_time_seconds > 0.0 {
                    input.base_time_seconds
                } else {
                    self.config.default_base_seconds
                };
                TimeAllocation {
                    base_time_seconds: base,
                    allocated_time_seconds: base,
                    multiplier: 1.0,
                    factors: TimeFactors::neutral(),
                    fallback: true,
                }
            }
        }
    }

    pub fn try_allocate(&self, input: &TimeAllocationInput) -> Result<TimeAllocation, AllocationError> {
        let base = input.base_time_seconds;
        if !base.is_finite() || base <= 0.0 {
            return Err(AllocationError::InvalidBaseTime(base));
        }
        let checks = [
            ("stress", input.stress),
            ("fatigue", input.fatigue),
            ("mastery", input.mastery),
            ("difficulty", input.difficulty),
            ("session_minutes", input.session_minutes),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(AllocationError::NonFiniteInput(name));
            }
        }

        let factors = TimeFactors {
            stress: 1.0 + 0.5 * input.stress.clamp(0.0, 1.0),
            fatigue: 1.0 + 0.3 * input.fatigue.clamp(0.0, 1.0),
            mastery: 1.0 - 0.3 * input.mastery.clamp(0.0, 1.0),
            difficulty: 1.0 + 0.2 * input.difficulty.clamp(0.0, 2.0),
            session: 1.0 + 0.1 * (input.session_minutes.max(0.0) / 60.0).min(1.0),
        };
        let (min, max) = (self.config.min_multiplier, self.config.max_multiplier);
        let multiplier = factors.product().clamp(min.min(max), max.max(min));

        Ok(TimeAllocation {
            base_time_seconds: base,
            allocated_time_seconds: base * multiplier,
            multiplier,
            factors,
            fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> TimeAllocationInput {
        TimeAllocationInput {
            base_time_seconds: 60.0,
            ..Default::default()
        }
    }

    #[test]
    fn neutral_inputs_keep_base_time() {
        let allocation = DynamicTimeAllocator::default().allocate(&input());
        assert_eq!(allocation.multiplier, 1.0);
        assert_eq!(allocation.allocated_time_seconds, 60.0);
        assert!(!allocation.fallback);
    }

    #[test]
    fn stress_extends_and_mastery_shortens() {
        let allocator = DynamicTimeAllocator::default();
        let stressed = allocator.allocate(&TimeAllocationInput { stress: 1.0, ..input() });
        let mastered = allocator.allocate(&TimeAllocationInput { mastery: 1.0, ..input() });
        assert!((stressed.allocated_time_seconds - 90.0).abs() < 1e-9);
        assert!((mastered.allocated_time_seconds - 42.0).abs() < 1e-9);
    }

    #[test]
    fn multiplier_is_clamped_to_band() {
        let allocator = DynamicTimeAllocator::default();
        let extreme = allocator.allocate(&TimeAllocationInput {
            stress: 1.0,
            fatigue: 1.0,
            difficulty: 2.0,
            session_minutes: 120.0,
            ..input()
        });
        assert_eq!(extreme.multiplier, 2.0);
        assert_eq!(extreme.allocated_time_seconds, 120.0);
    }

    #[test]
    fn invalid_input_falls_back_to_base() {
        let allocator = DynamicTimeAllocator::default();
        let allocation = allocator.allocate(&TimeAllocationInput {
            stress: f64::NAN,
            ..input()
        });
        assert!(allocation.fallback);
        assert_eq!(allocation.multiplier, 1.0);
        assert_eq!(allocation.allocated_time_seconds, 60.0);

        let zero_base = allocator.allocate(&TimeAllocationInput {
            base_time_seconds: 0.0,
            ..input()
        });
        assert!(zero_base.fallback);
        assert_eq!(zero_base.allocated_time_seconds, 60.0);
    }
}
