//! Boundary traits for the engine's external collaborators.
//!
//! Implementations: the in-memory store and metadata source in
//! [`crate::tutor::persistence`]; embedders supply database-backed ones.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tutor::error::{CollaboratorError, StoreError};
use crate::tutor::types::{BktParams, LoadAssessment, MasteryState, QuestionMetadata};

/// Append-only record of one mastery update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLogEntry {
    pub student_id: String,
    pub concept_id: String,
    pub previous_mastery: f64,
    pub new_mastery: f64,
    pub is_correct: bool,
    pub response_time_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_used: Option<BktParams>,
    #[serde(default)]
    pub explanation: serde_json::Value,
    pub logged_at: DateTime<Utc>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get_state(&self, student_id: &str, concept_id: &str) -> Result<Option<MasteryState>, StoreError>;

    /// Persists the new mastery and increments the practice count.
    async fn save_state(&self, student_id: &str, concept_id: &str, mastery: f64) -> Result<MasteryState, StoreError>;

    async fn get_parameters(&self, concept_id: &str) -> Result<Option<BktParams>, StoreError>;

    /// Best-effort; callers log and drop failures.
    async fn log_update(&self, entry: UpdateLogEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait QuestionMetadataSource: Send + Sync {
    async fn fetch(&self, question_id: &str) -> Result<Option<QuestionMetadata>, CollaboratorError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub student_id: String,
    pub item: Option<QuestionMetadata>,
    pub mastery: f64,
    pub stress_level: f64,
    #[serde(default)]
    pub context_factors: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_profile: Option<String>,
}

#[async_trait]
pub trait CognitiveLoadAssessor: Send + Sync {
    async fn assess(&self, request: LoadRequest) -> Result<LoadAssessment, CollaboratorError>;
}
