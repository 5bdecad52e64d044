#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use tutor_engine::tutor::collaborators::{CognitiveLoadAssessor, LoadRequest, StateStore, UpdateLogEntry};
use tutor_engine::tutor::error::{CollaboratorError, StoreError};
use tutor_engine::tutor::types::{BktParams, InteractionEvent, LoadAssessment, MasteryState, QuestionRecord};

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

pub fn event(student: &str, concept: &str, question: &str, correct: bool, offset_secs: i64) -> InteractionEvent {
    InteractionEvent {
        student_id: student.to_string(),
        concept_id: concept.to_string(),
        question_id: question.to_string(),
        is_correct: correct,
        response_time_ms: 20_000,
        timestamp: fixed_time() + chrono::Duration::seconds(offset_secs),
    }
}

pub fn question(id: &str, difficulty: f64, mastery: Option<f64>) -> QuestionRecord {
    QuestionRecord {
        question_id: id.to_string(),
        topic: "kinematics_basic".to_string(),
        difficulty,
        estimated_time_ms: 90_000.0,
        correct_score: 4.0,
        incorrect_score: -1.0,
        mastery_for_topic: mastery,
    }
}

pub fn question_pool() -> Vec<QuestionRecord> {
    vec![
        question("q-easy", 0.3, Some(0.5)),
        question("q-mid", 0.5, Some(0.5)),
        question("q-hard", 0.8, Some(0.5)),
        question("q-review", 0.2, Some(0.5)),
    ]
}

/// Store whose reads or writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub fail_reads: AtomicBool,
    pub fail_saves: AtomicBool,
    pub fail_logs: AtomicBool,
    pub saves_attempted: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get_state(&self, _student_id: &str, _concept_id: &str) -> Result<Option<MasteryState>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read replica down".into()));
        }
        Ok(None)
    }

    async fn save_state(&self, student_id: &str, concept_id: &str, mastery: f64) -> Result<MasteryState, StoreError> {
        self.saves_attempted.store(true, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".into()));
        }
        let mut state = MasteryState::new(student_id, concept_id, mastery);
        state.practice_count = 1;
        Ok(state)
    }

    async fn get_parameters(&self, _concept_id: &str) -> Result<Option<BktParams>, StoreError> {
        Ok(None)
    }

    async fn log_update(&self, _entry: UpdateLogEntry) -> Result<(), StoreError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("log table locked".into()));
        }
        Ok(())
    }
}

pub struct FailingAssessor;

#[async_trait]
impl CognitiveLoadAssessor for FailingAssessor {
    async fn assess(&self, _request: LoadRequest) -> Result<LoadAssessment, CollaboratorError> {
        Err(CollaboratorError::Failed("model not loaded".into()))
    }
}

pub struct SlowAssessor;

#[async_trait]
impl CognitiveLoadAssessor for SlowAssessor {
    async fn assess(&self, _request: LoadRequest) -> Result<LoadAssessment, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(LoadAssessment {
            fallback: false,
            ..LoadAssessment::fallback()
        })
    }
}

pub struct FixedAssessor(pub f64);

#[async_trait]
impl CognitiveLoadAssessor for FixedAssessor {
    async fn assess(&self, _request: LoadRequest) -> Result<LoadAssessment, CollaboratorError> {
        Ok(LoadAssessment {
            intrinsic_load: self.0,
            extraneous_load: 0.1,
            germane_load: 0.1,
            total_load: self.0,
            capacity: 1.0,
            overload_risk: (self.0 - 0.7).max(0.0),
            recommendations: Vec::new(),
            fallback: false,
        })
    }
}
