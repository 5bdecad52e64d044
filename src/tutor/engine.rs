use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::track_step;
use crate::tutor::collaborators::{
    CognitiveLoadAssessor, LoadRequest, QuestionMetadataSource, StateStore, UpdateLogEntry,
};
use crate::tutor::config::TutorConfig;
use crate::tutor::decision::{
    BanditContext, CandidateProvider, LinUcbModel, PressureAwareSelector, Selection, FEATURE_NAMES,
};
use crate::tutor::error::{StoreError, TutorError};
use crate::tutor::knowledge::{
    AdjustmentAudit, BktUpdate, CalibrationReport, CalibrationTracker, ConceptGraph,
    ConceptMasteryTracker, ContextualAdjuster, HalfLifeRegression, ParameterConstraintValidator,
    PersonalizedParams, ReviewSchedule,
};
use crate::tutor::knowledge::tracker::ProfileSnapshot;
use crate::tutor::metadata_cache::MetadataCache;
use crate::tutor::metrics::{registry, PipelineStep};
use crate::tutor::modeling::{
    DynamicTimeAllocator, StressAssessment, StressDetector, StressObservation, TimeAllocation,
    TimeAllocationInput,
};
use crate::tutor::monitoring::{FairnessMonitor, FairnessReport, InterventionManager, InterventionResult};
use crate::tutor::types::{
    BktParams, InteractionEvent, LoadAssessment, PerformanceRecord, QuestionMetadata, QuestionRecord,
};

const KEY_LOCK_PRUNE_THRESHOLD: usize = 10_000;
const CORRECT_SCORE_FEATURE: usize = 5;
const INCORRECT_SCORE_FEATURE: usize = 6;

/// One graded attempt plus the live signals and next-item pool around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub event: InteractionEvent,
    pub exam_id: String,
    pub subject_id: String,
    #[serde(default)]
    pub demographic_group: Option<String>,
    #[serde(default)]
    pub hesitation_ms: Option<f64>,
    #[serde(default)]
    pub keystroke_deviation: Option<f64>,
    #[serde(default)]
    pub session_minutes: f64,
    /// Points earned on this attempt; defaults to the credited arm's score features.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub candidates: Vec<QuestionRecord>,
    #[serde(default)]
    pub device_profile: Option<String>,
    #[serde(default)]
    pub context_factors: BTreeMap<String, f64>,
}

impl InteractionRequest {
    pub fn new(event: InteractionEvent, exam_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            event,
            exam_id: exam_id.into(),
            subject_id: subject_id.into(),
            demographic_group: None,
            hesitation_ms: None,
            keystroke_deviation: None,
            session_minutes: 0.0,
            score: None,
            candidates: Vec::new(),
            device_profile: None,
            context_factors: BTreeMap::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<QuestionRecord>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.demographic_group = Some(group.into());
        self
    }

    pub fn with_session_minutes(mut self, minutes: f64) -> Self {
        self.session_minutes = minutes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorSource {
    Stored,
    Transfer,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryOutcome {
    pub prior_source: PriorSource,
    pub update: BktUpdate,
    pub adjustment: AdjustmentAudit,
    pub personalized: PersonalizedParams,
    pub practice_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorDecision {
    pub decision_id: Uuid,
    pub student_id: String,
    pub concept_id: String,
    pub stress: StressAssessment,
    pub cognitive_load: LoadAssessment,
    pub time_allocation: TimeAllocation,
    pub mastery: MasteryOutcome,
    pub fairness: Option<FairnessReport>,
    pub schedule: ReviewSchedule,
    pub intervention: Option<InterventionResult>,
    pub selection: Option<Selection>,
    pub latency_ms: u64,
}

struct PendingEntry {
    context: BanditContext,
    last_seen: u64,
}

/// Last selection offered to each student, awaiting the answer that credits it.
struct PendingSelections {
    entries: HashMap<String, PendingEntry>,
    tick: u64,
    max_entries: usize,
}

impl PendingSelections {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            max_entries: max_entries.max(1),
        }
    }

    fn take(&mut self, student_id: &str) -> Option<BanditContext> {
        self.entries.remove(student_id).map(|e| e.context)
    }

    fn insert(&mut self, student_id: &str, context: BanditContext) {
        self.tick += 1;
        if !self.entries.contains_key(student_id) && self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                self.entries.remove(&id);
                tracing::debug!(student_id = %id, "dropped uncredited bandit selection");
            }
        }
        self.entries.insert(
            student_id.to_string(),
            PendingEntry {
                context,
                last_seen: self.tick,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct LoadedState {
    prior: f64,
    source: PriorSource,
    params: BktParams,
    metadata: Option<QuestionMetadata>,
    read_error: Option<StoreError>,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Composes every per-interaction step into one [`TutorDecision`].
pub struct ContextManager {
    config: TutorConfig,
    store: Arc<dyn StateStore>,
    metadata: Option<MetadataCache>,
    assessor: Option<Arc<dyn CognitiveLoadAssessor>>,
    adjuster: ContextualAdjuster,
    tracker: parking_lot::Mutex<ConceptMasteryTracker>,
    stress: parking_lot::Mutex<StressDetector>,
    allocator: DynamicTimeAllocator,
    candidates: CandidateProvider,
    selector: tokio::sync::Mutex<PressureAwareSelector>,
    scheduler: HalfLifeRegression,
    fairness: FairnessMonitor,
    interventions: InterventionManager,
    calibration: parking_lot::Mutex<CalibrationTracker>,
    pending: parking_lot::Mutex<PendingSelections>,
    key_locks: parking_lot::Mutex<HashMap<(String, String), KeyLock>>,
}

impl ContextManager {
    pub fn new(config: TutorConfig, store: Arc<dyn StateStore>) -> Self {
        let validator = ParameterConstraintValidator::new(config.constraints.clone());
        Self {
            store,
            metadata: None,
            assessor: None,
            adjuster: ContextualAdjuster::new(config.adjustment.clone(), validator.clone()),
            tracker: parking_lot::Mutex::new(ConceptMasteryTracker::new(
                config.tracker.clone(),
                ConceptGraph::standard(),
                validator,
            )),
            stress: parking_lot::Mutex::new(StressDetector::new(config.stress.clone())),
            allocator: DynamicTimeAllocator::new(config.time_allocation.clone()),
            candidates: CandidateProvider::new(config.candidates.clone()),
            selector: tokio::sync::Mutex::new(PressureAwareSelector::new(
                FEATURE_NAMES.len(),
                config.bandit.clone(),
            )),
            scheduler: HalfLifeRegression::from_config(&config.spaced_repetition),
            fairness: FairnessMonitor::new(config.fairness.clone()),
            interventions: InterventionManager::new(config.intervention.clone()),
            calibration: parking_lot::Mutex::new(CalibrationTracker::default()),
            pending: parking_lot::Mutex::new(PendingSelections::new(config.orchestrator.max_pending)),
            key_locks: parking_lot::Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_metadata_source(mut self, source: Arc<dyn QuestionMetadataSource>, ttl: Duration) -> Self {
        self.metadata = Some(MetadataCache::new(source, ttl));
        self
    }

    pub fn with_load_assessor(mut self, assessor: Arc<dyn CognitiveLoadAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_concept_graph(self, graph: ConceptGraph) -> Self {
        let validator = ParameterConstraintValidator::new(self.config.constraints.clone());
        *self.tracker.lock() = ConceptMasteryTracker::new(self.config.tracker.clone(), graph, validator);
        self
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn calibration_report(&self) -> Option<CalibrationReport> {
        self.calibration.lock().report()
    }

    pub fn profile_snapshot(&self, student_id: &str) -> Option<ProfileSnapshot> {
        self.tracker.lock().snapshot(student_id)
    }

    pub fn fairness_report(&self, exam_id: &str, subject_id: &str) -> Option<FairnessReport> {
        self.fairness.report(exam_id, subject_id)
    }

    pub fn pending_selections(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn intervention_history(&self, student_id: &str, concept_id: &str) -> usize {
        self.interventions.history_len(student_id, concept_id)
    }

    pub fn intervention_windows(&self) -> usize {
        self.interventions.topic_count()
    }

    pub async fn bandit_model(&self) -> LinUcbModel {
        self.selector.lock().await.model().clone()
    }

    /// Runs the full pipeline. Store read/save failures are returned only
    /// after every other step has run.
    pub async fn process(&self, request: InteractionRequest) -> Result<TutorDecision, TutorError> {
        let started = Instant::now();
        validate(&request)?;
        let event = &request.event;
        let student_id = event.student_id.as_str();
        let concept_id = event.concept_id.as_str();

        let key_lock = self.key_lock(student_id, concept_id);
        let _guard = key_lock.lock().await;

        let loaded = self.load_state(student_id, concept_id, &event.question_id).await;
        let mut persistence_error = loaded.read_error.clone();

        let stress = track_step!(PipelineStep::Stress, {
            self.stress.lock().observe(
                student_id,
                StressObservation {
                    response_time_ms: event.response_time_ms as f64,
                    is_correct: event.is_correct,
                    hesitation_ms: request.hesitation_ms,
                    keystroke_deviation: request.keystroke_deviation,
                },
            )
        });

        let cognitive_load = track_step!(
            PipelineStep::CognitiveLoad,
            self.assess_load(&request, &loaded, stress.stress_level).await
        );

        let time_allocation = track_step!(PipelineStep::TimeAllocation, {
            let base_time_seconds = loaded
                .metadata
                .as_ref()
                .map(|m| m.estimated_time_seconds)
                .unwrap_or(self.config.time_allocation.default_base_seconds);
            let allocation = self.allocator.allocate(&TimeAllocationInput {
                base_time_seconds,
                stress: stress.stress_level,
                fatigue: stress.indicators.fatigue,
                mastery: loaded.prior,
                difficulty: difficulty_of(&loaded),
                session_minutes: request.session_minutes,
            });
            if allocation.fallback {
                registry().record_fallback(PipelineStep::TimeAllocation);
            }
            allocation
        });

        let mastery = track_step!(PipelineStep::Mastery, {
            let adjusted = self
                .adjuster
                .adjust(&loaded.params, loaded.metadata.as_ref(), Some(event.response_time_ms));
            let tracked = self.tracker.lock().observe(
                student_id,
                loaded.prior,
                event.is_correct,
                &adjusted.params,
                stress.stress_level,
            );
            self.calibration
                .lock()
                .record(tracked.update.predicted_correctness, event.is_correct);

            let mut practice_count = None;
            if loaded.read_error.is_none() {
                match self
                    .store_call("save_state", self.store.save_state(student_id, concept_id, tracked.update.new_mastery))
                    .await
                {
                    Ok(state) => practice_count = Some(state.practice_count),
                    Err(err) => {
                        tracing::warn!(error = %err, student_id, concept_id, "failed to save mastery state");
                        persistence_error.get_or_insert(err);
                    }
                }
            }
            self.log_update(event, &tracked.update, &tracked.personalized.params).await;

            MasteryOutcome {
                prior_source: loaded.source,
                update: tracked.update,
                adjustment: adjusted.audit,
                personalized: tracked.personalized,
                practice_count,
            }
        });
        let new_mastery = mastery.update.new_mastery;

        // After a failed read, new_mastery rests on the default prior.
        let trusted_mastery = loaded.read_error.is_none();

        let fairness = track_step!(PipelineStep::Fairness, {
            match request.demographic_group.as_deref() {
                Some(group) if trusted_mastery => {
                    self.fairness
                        .record(&request.exam_id, &request.subject_id, group, new_mastery);
                }
                Some(_) => {
                    tracing::warn!(student_id, concept_id, "fairness sample skipped after state read failure");
                    registry().record_fallback(PipelineStep::Fairness);
                }
                None => {}
            }
            self.fairness.report(&request.exam_id, &request.subject_id)
        });

        let schedule = track_step!(PipelineStep::SpacedRepetition, {
            self.scheduler.schedule_guarded(
                difficulty_of(&loaded),
                new_mastery,
                event.timestamp,
                self.config.spaced_repetition.max_half_life_hours,
            )
        });

        let intervention = track_step!(PipelineStep::Intervention, {
            let allowed_ms = time_allocation.allocated_time_seconds * 1000.0;
            let time_pressure = if allowed_ms > 0.0 {
                (event.response_time_ms as f64 / allowed_ms).clamp(0.0, 1.0)
            } else {
                0.0
            };
            if trusted_mastery {
                self.interventions.record(
                    student_id,
                    concept_id,
                    PerformanceRecord {
                        is_correct: event.is_correct,
                        response_time_ms: event.response_time_ms,
                        difficulty: difficulty_of(&loaded),
                        mastery_before: mastery.update.previous_mastery,
                        mastery_after: new_mastery,
                        time_pressure,
                        fatigue: stress.indicators.fatigue,
                    },
                );
            } else {
                tracing::warn!(student_id, concept_id, "performance record skipped after state read failure");
                registry().record_fallback(PipelineStep::Intervention);
            }
            self.interventions.evaluate(student_id, concept_id, event.timestamp)
        });

        let selection = track_step!(
            PipelineStep::Bandit,
            self.credit_and_select(&request, stress.stress_level, cognitive_load.total_load)
                .await
        );

        let decision = TutorDecision {
            decision_id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            concept_id: concept_id.to_string(),
            stress,
            cognitive_load,
            time_allocation,
            mastery,
            fairness,
            schedule,
            intervention,
            selection,
            latency_ms: started.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            student_id,
            concept_id,
            new_mastery,
            latency_ms = decision.latency_ms,
            "interaction processed"
        );

        match persistence_error {
            Some(err) => Err(TutorError::Persistence(err)),
            None => Ok(decision),
        }
    }

    fn key_lock(&self, student_id: &str, concept_id: &str) -> KeyLock {
        let mut locks = self.key_locks.lock();
        if locks.len() > KEY_LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry((student_id.to_string(), concept_id.to_string()))
            .or_default()
            .clone()
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit = Duration::from_millis(self.config.orchestrator.collaborator_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!("{operation} timed out"))),
        }
    }

    async fn bounded<T, E: Display>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Option<T> {
        let limit = Duration::from_millis(self.config.orchestrator.collaborator_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, operation, "collaborator call failed");
                None
            }
            Err(_) => {
                tracing::warn!(operation, "collaborator call timed out");
                None
            }
        }
    }

    async fn load_state(&self, student_id: &str, concept_id: &str, question_id: &str) -> LoadedState {
        let state_fut = self.store_call("get_state", self.store.get_state(student_id, concept_id));
        let params_fut = self.bounded("get_parameters", self.store.get_parameters(concept_id));
        let metadata_fut = async {
            match &self.metadata {
                Some(cache) => {
                    let limit = Duration::from_millis(self.config.orchestrator.collaborator_timeout_ms);
                    tokio::time::timeout(limit, cache.get(question_id)).await.ok().flatten()
                }
                None => None,
            }
        };
        let (state, params, metadata) = tokio::join!(state_fut, params_fut, metadata_fut);

        let params = params.flatten().unwrap_or(self.config.default_params);
        let (prior, source, read_error) = match state {
            Ok(Some(state)) => (state.mastery_probability, PriorSource::Stored, None),
            Ok(None) => {
                let (prior, source) = self.transfer_prior(student_id, concept_id).await;
                (prior, source, None)
            }
            Err(err) => {
                tracing::warn!(error = %err, student_id, concept_id, "failed to read mastery state");
                (self.config.tracker.default_prior, PriorSource::Default, Some(err))
            }
        };

        LoadedState {
            prior,
            source,
            params,
            metadata,
            read_error,
        }
    }

    async fn transfer_prior(&self, student_id: &str, concept_id: &str) -> (f64, PriorSource) {
        let related = self.tracker.lock().related_concepts(concept_id);
        let mut masteries = Vec::new();
        for other in &related {
            if let Some(Some(state)) = self.bounded("get_state", self.store.get_state(student_id, other)).await {
                masteries.push(state.mastery_probability);
            }
        }
        let prior = self.tracker.lock().initial_prior(&masteries);
        let source = if masteries.is_empty() {
            PriorSource::Default
        } else {
            PriorSource::Transfer
        };
        (prior, source)
    }

    async fn assess_load(&self, request: &InteractionRequest, loaded: &LoadedState, stress_level: f64) -> LoadAssessment {
        let Some(assessor) = &self.assessor else {
            return LoadAssessment::fallback();
        };
        let load_request = LoadRequest {
            student_id: request.event.student_id.clone(),
            item: loaded.metadata.clone(),
            mastery: loaded.prior,
            stress_level,
            context_factors: request.context_factors.clone(),
            device_profile: request.device_profile.clone(),
        };
        match self.bounded("assess_load", assessor.assess(load_request)).await {
            Some(assessment) => assessment,
            None => {
                registry().record_fallback(PipelineStep::CognitiveLoad);
                LoadAssessment::fallback()
            }
        }
    }

    async fn log_update(&self, event: &InteractionEvent, update: &BktUpdate, params: &BktParams) {
        let entry = UpdateLogEntry {
            student_id: event.student_id.clone(),
            concept_id: event.concept_id.clone(),
            previous_mastery: update.previous_mastery,
            new_mastery: update.new_mastery,
            is_correct: event.is_correct,
            response_time_ms: event.response_time_ms,
            question_id: Some(event.question_id.clone()),
            params_used: Some(*params),
            explanation: serde_json::to_value(update.explanation).unwrap_or_default(),
            logged_at: event.timestamp,
        };
        if let Err(err) = self.store_call("log_update", self.store.log_update(entry)).await {
            tracing::warn!(error = %err, student_id = %event.student_id, "failed to log mastery update");
        }
    }

    async fn credit_and_select(&self, request: &InteractionRequest, stress: f64, load: f64) -> Option<Selection> {
        let event = &request.event;
        let mut selector = self.selector.lock().await;

        let pending = self.pending.lock().take(&event.student_id);
        if let Some(context) = pending.filter(|c| c.arm_id == event.question_id) {
            let score = request.score.unwrap_or_else(|| {
                let idx = if event.is_correct {
                    CORRECT_SCORE_FEATURE
                } else {
                    INCORRECT_SCORE_FEATURE
                };
                context.features.get(idx).copied().unwrap_or(0.0)
            });
            let reward = selector.reward(score, event.response_time_ms as f64);
            if let Err(err) = selector.update(&context, reward) {
                tracing::warn!(error = %err, arm_id = %context.arm_id, "bandit update failed");
                registry().record_fallback(PipelineStep::Bandit);
            }
        }

        let contexts = self.candidates.build(&request.candidates, stress, load);
        let selection = selector.select(&contexts)?;
        if !selection.pressure_aware {
            registry().record_fallback(PipelineStep::Bandit);
        }
        self.pending
            .lock()
            .insert(&event.student_id, selection.context.clone());
        Some(selection)
    }
}

fn difficulty_of(loaded: &LoadedState) -> f64 {
    loaded
        .metadata
        .as_ref()
        .and_then(|m| m.difficulty_calibrated)
        .filter(|d| d.is_finite())
        .unwrap_or(0.0)
}

fn validate(request: &InteractionRequest) -> Result<(), TutorError> {
    let event = &request.event;
    if event.student_id.trim().is_empty() {
        return Err(TutorError::InvalidInteraction("student_id is empty".into()));
    }
    if event.concept_id.trim().is_empty() {
        return Err(TutorError::InvalidInteraction("concept_id is empty".into()));
    }
    if event.response_time_ms < 0 {
        return Err(TutorError::InvalidInteraction(format!(
            "negative response time {}",
            event.response_time_ms
        )));
    }
    Ok(())
}
