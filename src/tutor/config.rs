use serde::{Deserialize, Serialize};

use crate::tutor::types::BktParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub margin: f64,
    pub learn_bounds: (f64, f64),
    pub slip_bounds: (f64, f64),
    pub guess_bounds: (f64, f64),
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            margin: 0.01,
            learn_bounds: (0.001, 0.50),
            slip_bounds: (0.001, 0.30),
            guess_bounds: (0.001, 0.50),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentConfig {
    pub difficulty_slip_weight: f64,
    pub fast_response_ms: i64,
    pub fast_response_guess_delta: f64,
    pub slow_response_ms: i64,
    pub slow_response_slip_delta: f64,
    pub learn_bounds: (f64, f64),
    pub slip_bounds: (f64, f64),
    pub guess_bounds: (f64, f64),
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            difficulty_slip_weight: 0.05,
            fast_response_ms: 1000,
            fast_response_guess_delta: 0.05,
            slow_response_ms: 30000,
            slow_response_slip_delta: 0.03,
            learn_bounds: (0.01, 0.5),
            slip_bounds: (0.01, 0.4),
            guess_bounds: (0.01, 0.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub default_prior: f64,
    pub transfer_base: f64,
    pub transfer_weight: f64,
    pub transfer_cap: f64,
    pub success_window: usize,
    pub min_window_events: usize,
    pub high_success_rate: f64,
    pub low_success_rate: f64,
    pub high_success_multiplier: f64,
    pub high_success_cap: f64,
    pub low_success_multiplier: f64,
    pub low_success_cap: f64,
    pub default_stress_tolerance: f64,
    pub tolerance_step: f64,
    pub recovery_trigger: u32,
    pub recovery_decay: f64,
    pub recovery_slip_reduction: f64,
    pub recovery_learn_boost: f64,
    pub max_profiles: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_prior: 0.2,
            transfer_base: 0.2,
            transfer_weight: 0.3,
            transfer_cap: 0.4,
            success_window: 10,
            min_window_events: 5,
            high_success_rate: 0.8,
            low_success_rate: 0.4,
            high_success_multiplier: 1.3,
            high_success_cap: 0.5,
            low_success_multiplier: 1.1,
            low_success_cap: 0.4,
            default_stress_tolerance: 0.5,
            tolerance_step: 0.02,
            recovery_trigger: 3,
            recovery_decay: 0.25,
            recovery_slip_reduction: 0.05,
            recovery_learn_boost: 0.3,
            max_profiles: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    pub window_size: usize,
    pub variance_floor: f64,
    pub max_learners: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            variance_floor: 1e-6,
            max_learners: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeAllocationConfig {
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub default_base_seconds: f64,
}

impl Default for TimeAllocationConfig {
    fn default() -> Self {
        Self {
            min_multiplier: 0.5,
            max_multiplier: 2.0,
            default_base_seconds: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub mastery_gate: f64,
    pub difficulty_gate: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            mastery_gate: 0.6,
            difficulty_gate: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    pub alpha: f64,
    pub epsilon: f64,
    pub seed: u64,
    pub reward_window_ms: f64,
    pub min_observed_ms: f64,
    /// Widest feature vector the model will grow to.
    pub max_dim: usize,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            epsilon: 0.0,
            seed: 42,
            reward_window_ms: 30000.0,
            min_observed_ms: 1000.0,
            max_dim: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacedRepetitionConfig {
    pub alpha: f64,
    pub beta: f64,
    pub max_half_life_hours: f64,
}

impl Default for SpacedRepetitionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            beta: -0.3,
            max_half_life_hours: 24.0 * 365.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessConfig {
    pub disparity_threshold: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            disparity_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionConfig {
    pub window_size: usize,
    pub min_points: usize,
    pub cooldown_secs: i64,
    pub decline_slope: f64,
    pub failure_streak: u32,
    pub low_accuracy: f64,
    /// Least recently seen (student, topic) windows are dropped beyond this.
    pub max_topics: usize,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_points: 5,
            cooldown_secs: 300,
            decline_slope: -0.1,
            failure_streak: 3,
            low_accuracy: 0.3,
            max_topics: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub collaborator_timeout_ms: u64,
    /// Students with an uncredited bandit selection; the least recently seen is dropped beyond this.
    pub max_pending: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 250,
            max_pending: 100_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TutorConfig {
    pub default_params: BktParams,
    pub constraints: ConstraintConfig,
    pub adjustment: AdjustmentConfig,
    pub tracker: TrackerConfig,
    pub stress: StressConfig,
    pub time_allocation: TimeAllocationConfig,
    pub candidates: CandidateConfig,
    pub bandit: BanditConfig,
    pub spaced_repetition: SpacedRepetitionConfig,
    pub fairness: FairnessConfig,
    pub intervention: InterventionConfig,
    pub orchestrator: OrchestratorConfig,
}

impl TutorConfig {
    /// Applies a `.env` file if present, then reads the environment.
    pub fn load() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            tracing::debug!(error = %err, "no .env file applied");
        }
        Self::from_env()
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_parse::<f64>("TUTOR_BANDIT_ALPHA") {
            config.bandit.alpha = val;
        }
        if let Some(val) = env_parse::<f64>("TUTOR_BANDIT_EPSILON") {
            config.bandit.epsilon = val.clamp(0.0, 1.0);
        }
        if let Some(val) = env_parse::<u64>("TUTOR_BANDIT_SEED") {
            config.bandit.seed = val;
        }
        if let Some(val) = env_parse::<usize>("TUTOR_STRESS_WINDOW") {
            config.stress.window_size = val.max(2);
        }
        if let Some(val) = env_parse::<f64>("TUTOR_TIME_MIN_MULTIPLIER") {
            config.time_allocation.min_multiplier = val;
        }
        if let Some(val) = env_parse::<f64>("TUTOR_TIME_MAX_MULTIPLIER") {
            config.time_allocation.max_multiplier = val;
        }
        if let Some(val) = env_parse::<f64>("TUTOR_HLR_ALPHA") {
            config.spaced_repetition.alpha = val;
        }
        if let Some(val) = env_parse::<f64>("TUTOR_HLR_BETA") {
            config.spaced_repetition.beta = val;
        }
        if let Some(val) = env_parse::<f64>("TUTOR_FAIRNESS_THRESHOLD") {
            config.fairness.disparity_threshold = val;
        }
        if let Some(val) = env_parse::<i64>("TUTOR_INTERVENTION_COOLDOWN_SECS") {
            config.intervention.cooldown_secs = val.max(0);
        }
        if let Some(val) = env_parse::<usize>("TUTOR_INTERVENTION_WINDOW") {
            config.intervention.window_size = val.max(config.intervention.min_points);
        }
        if let Some(val) = env_parse::<u64>("TUTOR_COLLABORATOR_TIMEOUT_MS") {
            config.orchestrator.collaborator_timeout_ms = val;
        }
        if let Some(val) = env_parse::<usize>("TUTOR_MAX_PENDING") {
            config.orchestrator.max_pending = val.max(1);
        }
        if let Some(val) = env_parse::<usize>("TUTOR_INTERVENTION_MAX_TOPICS") {
            config.intervention.max_topics = val.max(1);
        }

        if config.time_allocation.min_multiplier > config.time_allocation.max_multiplier {
            tracing::warn!(
                min = config.time_allocation.min_multiplier,
                max = config.time_allocation.max_multiplier,
                "time allocation band inverted, restoring defaults"
            );
            config.time_allocation = TimeAllocationConfig::default();
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(val) => Some(val),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
