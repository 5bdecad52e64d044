//! Knowledge layer - mastery estimation and review scheduling
//!
//! Contains:
//! - BKT math core (posterior, transition, prediction)
//! - Parameter constraint validation and projection
//! - Contextual parameter adjustment
//! - Concept mastery tracker with adaptive student profiles
//! - Half-life regression review scheduling
//! - Offline parameter estimation and calibration metrics

pub mod adjustment;
pub mod bkt;
pub mod calibration;
pub mod constraints;
pub mod estimation;
pub mod spaced_repetition;
pub mod tracker;

pub use adjustment::{AdjustedParameters, AdjustmentAudit, ContextualAdjuster};
pub use bkt::{BktExplanation, BktUpdate};
pub use calibration::{CalibrationReport, CalibrationTracker};
pub use constraints::{ConstraintViolation, ParameterConstraintValidator, ValidationReport};
pub use estimation::{estimate_parameters, EstimationGrid, EstimationResult};
pub use spaced_repetition::{HalfLifeRegression, ReviewSchedule};
pub use tracker::{ConceptGraph, ConceptMasteryTracker, PersonalizedParams, TrackedUpdate};
