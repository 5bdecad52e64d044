//! Concept mastery tracking with transfer priors and per-student adaptation.
//!
//! Profiles are owned by the tracker instance. Each profile keeps a bounded
//! outcome window; the profile map itself is capped at `max_profiles` and
//! evicts the least recently seen student.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::tutor::config::TrackerConfig;
use crate::tutor::knowledge::bkt::{self, BktUpdate};
use crate::tutor::knowledge::constraints::ParameterConstraintValidator;
use crate::tutor::types::BktParams;

#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    edges: HashMap<String, Vec<String>>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for (concept, related) in edges {
            graph.add(concept, related);
        }
        graph
    }

    pub fn add<S: Into<String>>(&mut self, concept: S, related: Vec<S>) {
        self.edges
            .entry(concept.into())
            .or_default()
            .extend(related.into_iter().map(Into::into));
    }

    pub fn related(&self, concept: &str) -> &[String] {
        self.edges.get(concept).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mechanics curriculum used when no custom table is supplied.
    pub fn standard() -> Self {
        Self::with_edges([
            ("kinematics_basic", vec!["vectors", "algebra_linear"]),
            ("kinematics_projectile", vec!["kinematics_basic", "trigonometry", "vectors"]),
            ("dynamics_newton", vec!["kinematics_basic", "vectors"]),
            ("work_energy", vec!["dynamics_newton", "kinematics_basic"]),
            ("momentum", vec!["dynamics_newton", "vectors"]),
            ("circular_motion", vec!["kinematics_projectile", "dynamics_newton", "trigonometry"]),
            ("rotational_dynamics", vec!["circular_motion", "momentum"]),
            ("oscillations", vec!["work_energy", "circular_motion", "trigonometry"]),
            ("vectors", vec!["trigonometry"]),
            ("trigonometry", vec!["algebra_linear"]),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressModifier {
    pub slip_delta: f64,
    pub guess_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub success_rate: Option<f64>,
    pub stress_tolerance: f64,
    pub consecutive_incorrect: u32,
    pub recovery_strength: f64,
}

#[derive(Debug, Clone)]
struct StudentProfile {
    outcomes: VecDeque<bool>,
    stress_tolerance: f64,
    consecutive_incorrect: u32,
    recovery_strength: f64,
    last_seen: u64,
}

impl StudentProfile {
    fn new(config: &TrackerConfig, tick: u64) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(config.success_window),
            stress_tolerance: config.default_stress_tolerance,
            consecutive_incorrect: 0,
            recovery_strength: 0.0,
            last_seen: tick,
        }
    }

    fn success_rate(&self, min_events: usize) -> Option<f64> {
        if self.outcomes.len() < min_events.max(1) {
            return None;
        }
        let correct = self.outcomes.iter().filter(|c| **c).count();
        Some(correct as f64 / self.outcomes.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizedParams {
    pub params: BktParams,
    pub learn_multiplier: f64,
    pub stress_modifier: StressModifier,
    pub recovery_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedUpdate {
    pub update: BktUpdate,
    pub personalized: PersonalizedParams,
}

pub struct ConceptMasteryTracker {
    config: TrackerConfig,
    graph: ConceptGraph,
    validator: ParameterConstraintValidator,
    profiles: HashMap<String, StudentProfile>,
    tick: u64,
}

impl ConceptMasteryTracker {
    pub fn new(config: TrackerConfig, graph: ConceptGraph, validator: ParameterConstraintValidator) -> Self {
        Self {
            config,
            graph,
            validator,
            profiles: HashMap::new(),
            tick: 0,
        }
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    pub fn related_concepts(&self, concept_id: &str) -> Vec<String> {
        self.graph.related(concept_id).to_vec()
    }

    /// Prior for a concept the student has never practised.
    pub fn initial_prior(&self, related_masteries: &[f64]) -> f64 {
        let known: Vec<f64> = related_masteries
            .iter()
            .copied()
            .filter(|m| m.is_finite())
            .map(|m| m.clamp(0.0, 1.0))
            .collect();
        if known.is_empty() {
            return self.config.default_prior;
        }
        let mean = known.iter().sum::<f64>() / known.len() as f64;
        (self.config.transfer_base + self.config.transfer_weight * mean).min(self.config.transfer_cap)
    }

    pub fn stress_modifier(&self, stress: f64, tolerance: f64) -> StressModifier {
        let stress = if stress.is_finite() { stress.clamp(0.0, 1.0) } else { 0.0 };
        let intolerance = 1.0 - tolerance.clamp(0.0, 1.0);

        if (0.2..=0.4).contains(&stress) {
            StressModifier {
                slip_delta: -0.05 * intolerance,
                guess_delta: 0.0,
            }
        } else if stress > 0.6 {
            let excess = stress - 0.6;
            StressModifier {
                slip_delta: excess * (0.1 + 0.2 * intolerance),
                guess_delta: -0.05 * excess * intolerance,
            }
        } else {
            StressModifier {
                slip_delta: 0.0,
                guess_delta: 0.0,
            }
        }
    }

    pub fn snapshot(&self, student_id: &str) -> Option<ProfileSnapshot> {
        self.profiles.get(student_id).map(|p| ProfileSnapshot {
            success_rate: p.success_rate(self.config.min_window_events),
            stress_tolerance: p.stress_tolerance,
            consecutive_incorrect: p.consecutive_incorrect,
            recovery_strength: p.recovery_strength,
        })
    }

    pub fn personalize(&self, student_id: &str, base: &BktParams, stress: f64) -> PersonalizedParams {
        let profile = self.profiles.get(student_id);
        let tolerance = profile
            .map(|p| p.stress_tolerance)
            .unwrap_or(self.config.default_stress_tolerance);
        let recovery = profile.map(|p| p.recovery_strength).unwrap_or(0.0);

        let mut learn = base.learn_rate;
        let mut learn_multiplier = 1.0;
        if let Some(rate) = profile.and_then(|p| p.success_rate(self.config.min_window_events)) {
            if rate > self.config.high_success_rate {
                learn_multiplier = self.config.high_success_multiplier;
                learn = (learn * learn_multiplier).min(self.config.high_success_cap);
            } else if rate < self.config.low_success_rate {
                learn_multiplier = self.config.low_success_multiplier;
                learn = (learn * learn_multiplier).min(self.config.low_success_cap);
            }
        }

        let modifier = self.stress_modifier(stress, tolerance);
        let mut slip = base.slip_rate + modifier.slip_delta;
        let guess = base.guess_rate + modifier.guess_delta;

        if recovery > 0.0 {
            slip -= self.config.recovery_slip_reduction * recovery;
            learn *= 1.0 + self.config.recovery_learn_boost * recovery;
        }

        let (params, _) = self
            .validator
            .enforce(&BktParams::new(learn, slip, guess), "student_personalization");

        PersonalizedParams {
            params,
            learn_multiplier,
            stress_modifier: modifier,
            recovery_strength: recovery,
        }
    }

    /// Runs one BKT step with personalized parameters and records the outcome.
    pub fn observe(
        &mut self,
        student_id: &str,
        prior_mastery: f64,
        correct: bool,
        params: &BktParams,
        stress: f64,
    ) -> TrackedUpdate {
        let personalized = self.personalize(student_id, params, stress);
        let update = bkt::update(prior_mastery, correct, &personalized.params);
        self.record_outcome(student_id, correct, stress);
        TrackedUpdate {
            update,
            personalized,
        }
    }

    pub fn record_outcome(&mut self, student_id: &str, correct: bool, stress: f64) {
        self.tick += 1;
        let tick = self.tick;
        if !self.profiles.contains_key(student_id) {
            self.evict_if_full();
        }
        let config = &self.config;
        let profile = self
            .profiles
            .entry(student_id.to_string())
            .or_insert_with(|| StudentProfile::new(config, tick));
        profile.last_seen = tick;

        profile.outcomes.push_back(correct);
        while profile.outcomes.len() > config.success_window {
            profile.outcomes.pop_front();
        }

        if stress > 0.6 {
            let step = if correct { config.tolerance_step } else { -config.tolerance_step };
            profile.stress_tolerance = (profile.stress_tolerance + step).clamp(0.1, 0.9);
        }

        if correct {
            profile.consecutive_incorrect = 0;
            profile.recovery_strength = (profile.recovery_strength - config.recovery_decay).max(0.0);
        } else {
            profile.consecutive_incorrect += 1;
            if profile.consecutive_incorrect >= config.recovery_trigger {
                if profile.recovery_strength == 0.0 {
                    tracing::info!(student_id, streak = profile.consecutive_incorrect, "recovery mode activated");
                }
                profile.recovery_strength = 1.0;
            }
        }
    }

    fn evict_if_full(&mut self) {
        if self.profiles.len() < self.config.max_profiles.max(1) {
            return;
        }
        let oldest = self
            .profiles
            .iter()
            .min_by_key(|(_, p)| p.last_seen)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.profiles.remove(&id);
            tracing::debug!(student_id = %id, "evicted idle student profile");
        }
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

impl Default for ConceptMasteryTracker {
    fn default() -> Self {
        Self::new(
            TrackerConfig::default(),
            ConceptGraph::standard(),
            ParameterConstraintValidator::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_without_related_history_is_flat() {
        let tracker = ConceptMasteryTracker::default();
        assert_eq!(tracker.initial_prior(&[]), 0.2);
    }

    #[test]
    fn prior_transfers_from_related_concepts_with_cap() {
        let tracker = ConceptMasteryTracker::default();
        let prior = tracker.initial_prior(&[0.2, 0.4]);
        assert!((prior - (0.2 + 0.3 * 0.3)).abs() < 1e-12);
        assert_eq!(tracker.initial_prior(&[1.0, 0.9]), 0.4);
    }

    #[test]
    fn standard_graph_links_kinematics() {
        let tracker = ConceptMasteryTracker::default();
        assert!(tracker
            .related_concepts("kinematics_basic")
            .contains(&"vectors".to_string()));
        assert!(tracker.related_concepts("unknown").is_empty());
    }

    #[test]
    fn high_success_boosts_learn_rate() {
        let mut tracker = ConceptMasteryTracker::default();
        for _ in 0..10 {
            tracker.record_outcome("s1", true, 0.0);
        }
        let personalized = tracker.personalize("s1", &BktParams::new(0.2, 0.1, 0.2), 0.0);
        assert!((personalized.params.learn_rate - 0.26).abs() < 1e-9);
        assert_eq!(personalized.learn_multiplier, 1.3);
    }

    #[test]
    fn learn_boost_respects_cap() {
        let mut tracker = ConceptMasteryTracker::default();
        for _ in 0..10 {
            tracker.record_outcome("s1", true, 0.0);
        }
        let personalized = tracker.personalize("s1", &BktParams::new(0.45, 0.1, 0.2), 0.0);
        assert!(personalized.params.learn_rate <= 0.5);
    }

    #[test]
    fn short_history_does_not_adapt() {
        let mut tracker = ConceptMasteryTracker::default();
        for _ in 0..3 {
            tracker.record_outcome("s1", true, 0.0);
        }
        let personalized = tracker.personalize("s1", &BktParams::new(0.2, 0.1, 0.2), 0.0);
        assert_eq!(personalized.learn_multiplier, 1.0);
    }

    #[test]
    fn mild_stress_helps_and_high_stress_hurts_intolerant_more() {
        let tracker = ConceptMasteryTracker::default();
        let mild = tracker.stress_modifier(0.3, 0.2);
        assert!(mild.slip_delta < 0.0);

        let none = tracker.stress_modifier(0.5, 0.2);
        assert_eq!(none.slip_delta, 0.0);

        let intolerant = tracker.stress_modifier(0.9, 0.1);
        let tolerant = tracker.stress_modifier(0.9, 0.9);
        assert!(intolerant.slip_delta > tolerant.slip_delta);
        assert!(tolerant.slip_delta > 0.0);
    }

    #[test]
    fn recovery_activates_after_three_misses_and_decays() {
        let mut tracker = ConceptMasteryTracker::default();
        for _ in 0..3 {
            tracker.record_outcome("s1", false, 0.0);
        }
        assert_eq!(tracker.snapshot("s1").map(|s| s.recovery_strength), Some(1.0));

        let boosted = tracker.personalize("s1", &BktParams::new(0.2, 0.2, 0.2), 0.0);
        assert!(boosted.params.slip_rate < 0.2);
        assert!(boosted.params.learn_rate > 0.2);

        tracker.record_outcome("s1", true, 0.0);
        assert_eq!(tracker.snapshot("s1").map(|s| s.recovery_strength), Some(0.75));
    }

    #[test]
    fn stress_tolerance_adapts_under_high_stress() {
        let mut tracker = ConceptMasteryTracker::default();
        tracker.record_outcome("s1", true, 0.8);
        tracker.record_outcome("s1", true, 0.8);
        let snap = tracker.snapshot("s1").unwrap();
        assert!((snap.stress_tolerance - 0.54).abs() < 1e-9);
    }

    #[test]
    fn profiles_are_evicted_when_full() {
        let config = TrackerConfig {
            max_profiles: 2,
            ..TrackerConfig::default()
        };
        let mut tracker = ConceptMasteryTracker::new(
            config,
            ConceptGraph::standard(),
            ParameterConstraintValidator::default(),
        );
        tracker.record_outcome("a", true, 0.0);
        tracker.record_outcome("b", true, 0.0);
        tracker.record_outcome("c", true, 0.0);
        assert_eq!(tracker.profile_count(), 2);
        assert!(tracker.snapshot("a").is_none());
    }

    #[test]
    fn observe_returns_feasible_update() {
        let mut tracker = ConceptMasteryTracker::default();
        let result = tracker.observe("s1", 0.3, true, &BktParams::new(0.25, 0.1, 0.2), 0.0);
        assert!(result.update.new_mastery > 0.3);
        assert_eq!(result.personalized.params, BktParams::new(0.25, 0.1, 0.2));
    }
}
