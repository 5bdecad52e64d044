pub mod fairness;
pub mod intervention;

pub use fairness::{FairnessMonitor, FairnessRecommendation, FairnessReport};
pub use intervention::{
    DeclineMetrics, InterventionAction, InterventionManager, InterventionResult, InterventionStrategy,
};
