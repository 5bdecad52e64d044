//! End-to-end tests for the ContextManager pipeline.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use tutor_engine::tutor::config::{BanditConfig, TutorConfig};
use tutor_engine::tutor::engine::{ContextManager, InteractionRequest, PriorSource};
use tutor_engine::tutor::error::TutorError;
use tutor_engine::tutor::monitoring::InterventionStrategy;
use tutor_engine::tutor::persistence::InMemoryStateStore;
use tutor_engine::tutor::types::BktParams;

async fn scenario_store() -> Arc<InMemoryStateStore> {
    let store = Arc::new(InMemoryStateStore::new());
    store.seed_state("s1", "kinematics_basic", 0.3).await;
    store
        .set_parameters("kinematics_basic", BktParams::new(0.25, 0.10, 0.20))
        .await;
    store
}

fn exploring_config() -> TutorConfig {
    TutorConfig {
        bandit: BanditConfig {
            epsilon: 0.3,
            seed: 1234,
            ..BanditConfig::default()
        },
        ..TutorConfig::default()
    }
}

/// Answers C, C, I, C, C and returns (masteries, selected arms).
async fn run_scenario() -> (Vec<f64>, Vec<String>) {
    let store = scenario_store().await;
    let manager = ContextManager::new(exploring_config(), store);
    let answers = [true, true, false, true, true];
    let mut question_id = "q-start".to_string();
    let mut masteries = Vec::new();
    let mut arms = Vec::new();

    for (i, correct) in answers.iter().enumerate() {
        let request = InteractionRequest::new(
            event("s1", "kinematics_basic", &question_id, *correct, i as i64 * 60),
            "jee",
            "physics",
        )
        .with_candidates(question_pool());
        let decision = manager.process(request).await.unwrap();
        masteries.push(decision.mastery.update.new_mastery);
        let selection = decision.selection.unwrap();
        question_id = selection.arm_id.clone();
        arms.push(selection.arm_id);
    }
    (masteries, arms)
}

#[tokio::test]
async fn scenario_mastery_rises_and_is_reproducible() {
    let (masteries, arms) = run_scenario().await;
    assert_eq!(masteries.len(), 5);
    assert!(masteries[0] > 0.3);
    assert!(masteries[1] > masteries[0]);
    assert!(*masteries.last().unwrap() > 0.3);
    assert!(masteries.iter().all(|m| *m > 0.0 && *m < 1.0));

    let (again, arms_again) = run_scenario().await;
    assert_eq!(masteries, again);
    assert_eq!(arms, arms_again);
}

#[tokio::test]
async fn stored_state_is_used_and_saved() {
    let store = scenario_store().await;
    let manager = ContextManager::new(TutorConfig::default(), store.clone());
    let decision = manager
        .process(InteractionRequest::new(
            event("s1", "kinematics_basic", "q1", true, 0),
            "jee",
            "physics",
        ))
        .await
        .unwrap();

    assert_eq!(decision.mastery.prior_source, PriorSource::Stored);
    assert!((decision.mastery.update.previous_mastery - 0.3).abs() < 1e-12);
    assert_eq!(decision.mastery.adjustment.base, BktParams::new(0.25, 0.10, 0.20));
    assert_eq!(decision.mastery.practice_count, Some(1));

    let logged = store.log_entries().await;
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].question_id.as_deref(), Some("q1"));
    assert!(manager.calibration_report().is_some());
}

#[tokio::test]
async fn answering_the_selected_question_credits_the_bandit() {
    let manager = ContextManager::new(TutorConfig::default(), scenario_store().await);
    let first = manager
        .process(
            InteractionRequest::new(event("s1", "kinematics_basic", "q0", true, 0), "jee", "physics")
                .with_candidates(question_pool()),
        )
        .await
        .unwrap();
    let chosen = first.selection.unwrap().arm_id;
    assert_eq!(manager.bandit_model().await.update_count(), 0);

    manager
        .process(
            InteractionRequest::new(event("s1", "kinematics_basic", &chosen, true, 60), "jee", "physics")
                .with_candidates(question_pool()),
        )
        .await
        .unwrap();
    let model = manager.bandit_model().await;
    assert_eq!(model.update_count(), 1);
    assert!(model.b_vector().iter().any(|v| *v != 0.0));
}

#[tokio::test]
async fn failing_assessor_degrades_to_default_load() {
    let manager = ContextManager::new(TutorConfig::default(), scenario_store().await)
        .with_load_assessor(Arc::new(FailingAssessor));
    let decision = manager
        .process(
            InteractionRequest::new(event("s1", "kinematics_basic", "q1", true, 0), "jee", "physics")
                .with_candidates(question_pool()),
        )
        .await
        .unwrap();
    assert!(decision.cognitive_load.fallback);
    assert!(decision.selection.is_some());
}

#[tokio::test(start_paused = true)]
async fn slow_assessor_times_out() {
    let manager = ContextManager::new(TutorConfig::default(), scenario_store().await)
        .with_load_assessor(Arc::new(SlowAssessor));
    let decision = manager
        .process(InteractionRequest::new(
            event("s1", "kinematics_basic", "q1", false, 0),
            "jee",
            "physics",
        ))
        .await
        .unwrap();
    assert!(decision.cognitive_load.fallback);
}

#[tokio::test]
async fn assessor_load_reaches_bandit_features() {
    let manager = ContextManager::new(TutorConfig::default(), scenario_store().await)
        .with_load_assessor(Arc::new(FixedAssessor(0.65)));
    let decision = manager
        .process(
            InteractionRequest::new(event("s1", "kinematics_basic", "q1", true, 0), "jee", "physics")
                .with_candidates(question_pool()),
        )
        .await
        .unwrap();
    assert!(!decision.cognitive_load.fallback);
    let selection = decision.selection.unwrap();
    assert_eq!(selection.context.features[4], 0.65);
}

#[tokio::test]
async fn save_failure_is_returned_after_pipeline_runs() {
    let store = Arc::new(FlakyStore::default());
    store.fail_saves.store(true, Ordering::SeqCst);
    let manager = ContextManager::new(TutorConfig::default(), store.clone());

    let result = manager
        .process(InteractionRequest::new(
            event("s1", "optics", "q1", true, 0),
            "jee",
            "physics",
        ))
        .await;
    assert!(matches!(result, Err(TutorError::Persistence(_))));
    assert!(manager.profile_snapshot("s1").is_some());
}

#[tokio::test]
async fn read_failure_skips_save() {
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);
    let manager = ContextManager::new(TutorConfig::default(), store.clone());

    let result = manager
        .process(InteractionRequest::new(
            event("s1", "optics", "q1", true, 0),
            "jee",
            "physics",
        ))
        .await;
    assert!(matches!(result, Err(TutorError::Persistence(_))));
    assert!(!store.saves_attempted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn read_failure_keeps_default_prior_out_of_shared_stats() {
    let store = Arc::new(FlakyStore::default());
    let manager = ContextManager::new(TutorConfig::default(), store.clone());

    manager
        .process(InteractionRequest::new(event("a", "optics", "q1", true, 0), "jee", "physics").with_group("urban"))
        .await
        .unwrap();
    assert_eq!(manager.intervention_history("a", "optics"), 1);

    store.fail_reads.store(true, Ordering::SeqCst);
    let result = manager
        .process(InteractionRequest::new(event("b", "optics", "q1", false, 30), "jee", "physics").with_group("rural"))
        .await;
    assert!(matches!(result, Err(TutorError::Persistence(_))));

    let report = manager.fairness_report("jee", "physics");
    assert!(report.map_or(true, |r| !r.group_averages.contains_key("rural")));
    assert_eq!(manager.intervention_history("b", "optics"), 0);
}

#[tokio::test]
async fn ungrouped_requests_stay_out_of_fairness() {
    let manager = ContextManager::new(TutorConfig::default(), Arc::new(InMemoryStateStore::new()));
    manager
        .process(InteractionRequest::new(event("s1", "optics", "q1", true, 0), "jee", "physics").with_group("urban"))
        .await
        .unwrap();
    let decision = manager
        .process(InteractionRequest::new(event("s2", "optics", "q1", false, 0), "jee", "physics"))
        .await
        .unwrap();
    assert!(decision.fairness.is_none());
}

#[tokio::test]
async fn per_student_maps_are_bounded() {
    let mut config = TutorConfig::default();
    config.orchestrator.max_pending = 3;
    config.intervention.max_topics = 3;
    let manager = ContextManager::new(config, Arc::new(InMemoryStateStore::new()));

    for i in 0..20 {
        let student = format!("s{i}");
        let concept = format!("c{i}");
        manager
            .process(
                InteractionRequest::new(event(&student, &concept, "q1", true, 0), "jee", "physics")
                    .with_candidates(question_pool()),
            )
            .await
            .unwrap();
    }
    assert_eq!(manager.pending_selections(), 3);
    assert_eq!(manager.intervention_windows(), 3);
    assert_eq!(manager.intervention_history("s19", "c19"), 1);
    assert_eq!(manager.intervention_history("s0", "c0"), 0);
}

#[tokio::test]
async fn log_failure_is_swallowed() {
    let store = Arc::new(FlakyStore::default());
    store.fail_logs.store(true, Ordering::SeqCst);
    let manager = ContextManager::new(TutorConfig::default(), store);

    let decision = manager
        .process(InteractionRequest::new(
            event("s1", "optics", "q1", true, 0),
            "jee",
            "physics",
        ))
        .await
        .unwrap();
    assert_eq!(decision.mastery.practice_count, Some(1));
}

#[tokio::test]
async fn repeated_failures_trigger_critical_intervention() {
    let manager = ContextManager::new(TutorConfig::default(), scenario_store().await);
    let answers = [true, false, false, false, false];
    let mut last = None;
    for (i, correct) in answers.iter().enumerate() {
        let decision = manager
            .process(InteractionRequest::new(
                event("s1", "kinematics_basic", "q1", *correct, i as i64 * 30),
                "jee",
                "physics",
            ))
            .await
            .unwrap();
        last = decision.intervention;
    }
    let intervention = last.unwrap();
    assert_eq!(intervention.strategy, InterventionStrategy::Critical);
    assert!(!intervention.recommendations.is_empty());
}

#[tokio::test]
async fn fairness_report_appears_with_two_groups() {
    let manager = ContextManager::new(TutorConfig::default(), Arc::new(InMemoryStateStore::new()));
    let first = manager
        .process(
            InteractionRequest::new(event("s1", "optics", "q1", true, 0), "jee", "physics").with_group("urban"),
        )
        .await
        .unwrap();
    assert!(first.fairness.is_none());

    let second = manager
        .process(
            InteractionRequest::new(event("s2", "optics", "q1", false, 0), "jee", "physics").with_group("rural"),
        )
        .await
        .unwrap();
    let report = second.fairness.unwrap();
    assert_eq!(report.group_averages.len(), 2);
    assert!(report.disparity > 0.0);
}

#[tokio::test]
async fn concurrent_updates_on_one_key_are_serialized() {
    let store = Arc::new(InMemoryStateStore::new());
    let manager = Arc::new(ContextManager::new(TutorConfig::default(), store.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .process(InteractionRequest::new(
                    event("s1", "optics", "q1", i % 2 == 0, i),
                    "jee",
                    "physics",
                ))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    use tutor_engine::tutor::collaborators::StateStore;
    let state = store.get_state("s1", "optics").await.unwrap().unwrap();
    assert_eq!(state.practice_count, 8);
}
