//! In-memory collaborators for tests and embedders without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::tutor::collaborators::{QuestionMetadataSource, StateStore, UpdateLogEntry};
use crate::tutor::error::{CollaboratorError, StoreError};
use crate::tutor::types::{BktParams, MasteryState, QuestionMetadata};

type StateKey = (String, String);

pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<StateKey, MasteryState>>>,
    parameters: Arc<RwLock<HashMap<String, BktParams>>>,
    log: Arc<RwLock<Vec<UpdateLogEntry>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            parameters: Arc::new(RwLock::new(HashMap::new())),
            log: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn seed_state(&self, student_id: &str, concept_id: &str, mastery: f64) {
        self.states.write().await.insert(
            (student_id.to_string(), concept_id.to_string()),
            MasteryState::new(student_id, concept_id, mastery),
        );
    }

    pub async fn set_parameters(&self, concept_id: &str, params: BktParams) {
        self.parameters.write().await.insert(concept_id.to_string(), params);
    }

    pub async fn log_entries(&self) -> Vec<UpdateLogEntry> {
        self.log.read().await.clone()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_state(&self, student_id: &str, concept_id: &str) -> Result<Option<MasteryState>, StoreError> {
        let states = self.states.read().await;
        Ok(states.get(&(student_id.to_string(), concept_id.to_string())).cloned())
    }

    async fn save_state(&self, student_id: &str, concept_id: &str, mastery: f64) -> Result<MasteryState, StoreError> {
        if !mastery.is_finite() {
            return Err(StoreError::Backend(format!("refusing non-finite mastery {mastery}")));
        }
        let mut states = self.states.write().await;
        let state = states
            .entry((student_id.to_string(), concept_id.to_string()))
            .or_insert_with(|| MasteryState::new(student_id, concept_id, mastery));
        state.mastery_probability = mastery.clamp(0.0, 1.0);
        state.practice_count += 1;
        Ok(state.clone())
    }

    async fn get_parameters(&self, concept_id: &str) -> Result<Option<BktParams>, StoreError> {
        Ok(self.parameters.read().await.get(concept_id).copied())
    }

    async fn log_update(&self, entry: UpdateLogEntry) -> Result<(), StoreError> {
        self.log.write().await.push(entry);
        Ok(())
    }
}

pub struct InMemoryMetadataSource {
    items: Arc<RwLock<HashMap<String, QuestionMetadata>>>,
}

impl InMemoryMetadataSource {
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = QuestionMetadata>) -> Self {
        let map = items.into_iter().map(|m| (m.question_id.clone(), m)).collect();
        Self {
            items: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, metadata: QuestionMetadata) {
        self.items.write().await.insert(metadata.question_id.clone(), metadata);
    }
}

impl Default for InMemoryMetadataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuestionMetadataSource for InMemoryMetadataSource {
    async fn fetch(&self, question_id: &str) -> Result<Option<QuestionMetadata>, CollaboratorError> {
        Ok(self.items.read().await.get(question_id).cloned())
    }
}
