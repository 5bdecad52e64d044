//! Adaptive tutoring decision engine.
//!
//! Layers, leaves first:
//! - `knowledge`: BKT math, parameter constraints, contextual adjustment,
//!   mastery tracking, review scheduling
//! - `modeling`: stress detection and time allocation
//! - `decision`: candidate gating and the pressure-aware LinUCB selector
//! - `monitoring`: fairness and performance-decline interventions
//! - `engine`: the per-interaction [`ContextManager`]

pub mod collaborators;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod metadata_cache;
pub mod metrics;
pub mod modeling;
pub mod monitoring;
pub mod persistence;
pub mod types;

pub use collaborators::{CognitiveLoadAssessor, LoadRequest, QuestionMetadataSource, StateStore, UpdateLogEntry};
pub use config::TutorConfig;
pub use engine::{ContextManager, InteractionRequest, MasteryOutcome, PriorSource, TutorDecision};
pub use error::{BanditError, CollaboratorError, StoreError, TutorError};
pub use metadata_cache::MetadataCache;
pub use persistence::{InMemoryMetadataSource, InMemoryStateStore};
pub use types::*;
