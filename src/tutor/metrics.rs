use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

static REGISTRY: OnceLock<Arc<StepRegistry>> = OnceLock::new();

pub fn registry() -> &'static Arc<StepRegistry> {
    REGISTRY.get_or_init(|| Arc::new(StepRegistry::new()))
}

/// One entry per orchestrator pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    Stress,
    CognitiveLoad,
    TimeAllocation,
    Mastery,
    Fairness,
    SpacedRepetition,
    Intervention,
    Bandit,
}

impl PipelineStep {
    pub fn all() -> &'static [PipelineStep] {
        &[
            PipelineStep::Stress,
            PipelineStep::CognitiveLoad,
            PipelineStep::TimeAllocation,
            PipelineStep::Mastery,
            PipelineStep::Fairness,
            PipelineStep::SpacedRepetition,
            PipelineStep::Intervention,
            PipelineStep::Bandit,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            PipelineStep::Stress => "modeling_stress",
            PipelineStep::CognitiveLoad => "modeling_cognitive_load",
            PipelineStep::TimeAllocation => "modeling_time_allocation",
            PipelineStep::Mastery => "knowledge_bkt",
            PipelineStep::Fairness => "monitoring_fairness",
            PipelineStep::SpacedRepetition => "knowledge_hlr",
            PipelineStep::Intervention => "monitoring_intervention",
            PipelineStep::Bandit => "decision_linucb",
        }
    }

    pub fn layer(&self) -> &'static str {
        match self {
            PipelineStep::Stress | PipelineStep::CognitiveLoad | PipelineStep::TimeAllocation => "modeling",
            PipelineStep::Mastery | PipelineStep::SpacedRepetition => "knowledge",
            PipelineStep::Fairness | PipelineStep::Intervention => "monitoring",
            PipelineStep::Bandit => "decision",
        }
    }
}

#[derive(Debug, Default)]
pub struct StepMetrics {
    call_count: AtomicU64,
    total_latency_us: AtomicU64,
    fallback_count: AtomicU64,
}

impl StepMetrics {
    pub fn record_call(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let calls = self.call_count();
        if calls == 0 {
            return 0.0;
        }
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        let avg = (total_us as f64 / calls as f64) / 1000.0;
        (avg * 10000.0).round() / 10000.0
    }
}

pub struct StepRegistry {
    metrics: HashMap<PipelineStep, StepMetrics>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        let metrics = PipelineStep::all()
            .iter()
            .map(|step| (*step, StepMetrics::default()))
            .collect();
        Self { metrics }
    }

    pub fn record(&self, step: PipelineStep, latency_us: u64) {
        if let Some(m) = self.metrics.get(&step) {
            m.record_call(latency_us);
        }
    }

    pub fn record_fallback(&self, step: PipelineStep) {
        if let Some(m) = self.metrics.get(&step) {
            m.record_fallback();
        }
    }

    pub fn get(&self, step: PipelineStep) -> Option<&StepMetrics> {
        self.metrics.get(&step)
    }

    pub fn snapshot(&self) -> Vec<StepStatus> {
        PipelineStep::all()
            .iter()
            .filter_map(|step| {
                let m = self.metrics.get(step)?;
                Some(StepStatus {
                    id: step.id().to_string(),
                    layer: step.layer().to_string(),
                    call_count: m.call_count(),
                    avg_latency_ms: m.avg_latency_ms(),
                    fallback_count: m.fallback_count(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub id: String,
    pub layer: String,
    pub call_count: u64,
    pub avg_latency_ms: f64,
    pub fallback_count: u64,
}

#[macro_export]
macro_rules! track_step {
    ($step:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        let latency_us = start.elapsed().as_micros() as u64;
        $crate::tutor::metrics::registry().record($step, latency_us);
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_registry_counts_calls() {
        let registry = StepRegistry::new();
        registry.record(PipelineStep::Bandit, 1500);
        registry.record(PipelineStep::Bandit, 500);
        registry.record_fallback(PipelineStep::Bandit);
        let m = registry.get(PipelineStep::Bandit).unwrap();
        assert_eq!(m.call_count(), 2);
        assert_eq!(m.fallback_count(), 1);
        assert!((m.avg_latency_ms() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_lists_every_step() {
        let snapshot = StepRegistry::new().snapshot();
        assert_eq!(snapshot.len(), PipelineStep::all().len());
        assert!(snapshot.iter().all(|s| s.call_count == 0));
    }

    #[test]
    fn macro_records_into_global_registry() {
        let before = registry().get(PipelineStep::Fairness).map_or(0, |m| m.call_count());
        let value = track_step!(PipelineStep::Fairness, 2 + 2);
        assert_eq!(value, 4);
        let after = registry().get(PipelineStep::Fairness).map_or(0, |m| m.call_count());
        assert!(after > before);
    }
}
