#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BanditError {
    #[error("cannot shrink bandit from dimension {current} to {requested}")]
    Shrink { current: usize, requested: usize },
    #[error("feature width {requested} exceeds bandit limit {limit}")]
    DimensionLimit { requested: usize, limit: usize },
    #[error("resize invariant violated: score drift {drift} on feature {feature}")]
    ResizeInvariant { feature: usize, drift: f64 },
    #[error("non-finite feature at index {0}")]
    NonFiniteFeature(usize),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    #[error("invalid base time: {0}")]
    InvalidBaseTime(f64),
    #[error("non-finite input: {0}")]
    NonFiniteInput(&'static str),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimationError {
    #[error("no response sequences to fit")]
    EmptyInput,
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
    #[error("invalid interaction: {0}")]
    InvalidInteraction(String),
}
