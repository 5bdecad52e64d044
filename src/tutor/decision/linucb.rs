use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::tutor::config::BanditConfig;
use crate::tutor::decision::candidates::{LOAD_FEATURE, STRESS_FEATURE};
use crate::tutor::error::BanditError;

const RESIZE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditContext {
    pub arm_id: String,
    pub features: Vec<f64>,
}

impl BanditContext {
    pub fn new(arm_id: impl Into<String>, features: Vec<f64>) -> Self {
        Self {
            arm_id: arm_id.into(),
            features,
        }
    }
}

/// Shared-parameter LinUCB over question feature vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUcbModel {
    d: usize,
    alpha: f64,
    a: Vec<Vec<f64>>,
    b: Vec<f64>,
    #[serde(default)]
    update_count: u64,
}

impl LinUcbModel {
    pub fn new(d: usize, alpha: f64) -> Self {
        let mut a = vec![vec![0.0; d]; d];
        for (i, row) in a.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self {
            d,
            alpha,
            a,
            b: vec![0.0; d],
            update_count: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.d
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn a_matrix(&self) -> &[Vec<f64>] {
        &self.a
    }

    pub fn b_vector(&self) -> &[f64] {
        &self.b
    }

    pub fn theta(&self) -> Vec<f64> {
        let a_inv = invert_matrix(&self.a);
        matrix_vector_mul(&a_inv, &self.b)
    }

    /// Zero-pads short vectors; components past `d` are ignored.
    fn fit(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.d];
        for (slot, value) in out.iter_mut().zip(x.iter()) {
            *slot = *value;
        }
        out
    }

    pub fn score(&self, x: &[f64]) -> f64 {
        let x = self.fit(x);
        let a_inv = invert_matrix(&self.a);
        let theta = matrix_vector_mul(&a_inv, &self.b);
        let exploitation = dot_product(&theta, &x);
        let temp = matrix_vector_mul(&a_inv, &x);
        let confidence = dot_product(&x, &temp).max(0.0).sqrt();
        exploitation + self.alpha * confidence
    }

    /// Highest score wins; ties keep the first-seen arm.
    pub fn select(&self, contexts: &[BanditContext]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, ctx) in contexts.iter().enumerate() {
            let score = self.score(&ctx.features);
            let better = match best {
                None => true,
                Some((_, best_score)) => score > best_score,
            };
            if better {
                best = Some((idx, score));
            }
        }
        best
    }

    /// Embeds `A`/`b` in the top-left block of a larger identity/zero system.
    pub fn grow_to(&mut self, new_d: usize) -> Result<(), BanditError> {
        if new_d == self.d {
            return Ok(());
        }
        if new_d < self.d {
            return Err(BanditError::Shrink {
                current: self.d,
                requested: new_d,
            });
        }

        let old_d = self.d;
        let probes: Vec<f64> = (0..old_d).map(|i| self.score(&unit_vector(old_d, i))).collect();
        let previous = self.clone();

        let mut a = vec![vec![0.0; new_d]; new_d];
        for (i, row) in a.iter_mut().enumerate() {
            if i < old_d {
                row[..old_d].copy_from_slice(&self.a[i]);
            } else {
                row[i] = 1.0;
            }
        }
        let mut b = vec![0.0; new_d];
        b[..old_d].copy_from_slice(&self.b);

        self.a = a;
        self.b = b;
        self.d = new_d;

        for (i, before) in probes.iter().enumerate() {
            let after = self.score(&unit_vector(old_d, i));
            let drift = (after - before).abs();
            if !drift.is_finite() || drift > RESIZE_TOLERANCE * before.abs().max(1.0) {
                *self = previous;
                return Err(BanditError::ResizeInvariant { feature: i, drift });
            }
        }

        tracing::info!(from = old_d, to = new_d, "bandit feature dimension grown");
        Ok(())
    }

    pub fn update(&mut self, x: &[f64], reward: f64) -> Result<(), BanditError> {
        if let Some(idx) = x.iter().position(|v| !v.is_finite()) {
            return Err(BanditError::NonFiniteFeature(idx));
        }
        if !reward.is_finite() {
            return Err(BanditError::NonFiniteFeature(usize::MAX));
        }
        if x.len() > self.d {
            self.grow_to(x.len())?;
        }
        let x = self.fit(x);
        for i in 0..self.d {
            for j in 0..self.d {
                self.a[i][j] += x[i] * x[j];
            }
            self.b[i] += reward * x[i];
        }
        self.update_count += 1;
        Ok(())
    }
}

fn unit_vector(d: usize, i: usize) -> Vec<f64> {
    let mut v = vec![0.0; d];
    v[i] = 1.0;
    v
}

fn invert_matrix(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = m.len();
    let mut aug = vec![vec![0.0; 2 * n]; n];
    for i in 0..n {
        aug[i][..n].copy_from_slice(&m[i][..n]);
        aug[i][n + i] = 1.0;
    }

    let mut is_singular = false;

    for i in 0..n {
        let mut max_row = i;
        for k in (i + 1)..n {
            if aug[k][i].abs() > aug[max_row][i].abs() {
                max_row = k;
            }
        }
        aug.swap(i, max_row);

        if aug[i][i].abs() < 1e-10 {
            is_singular = true;
            aug[i][i] = 1e-10;
        }

        let pivot = aug[i][i];
        for value in aug[i].iter_mut() {
            *value /= pivot;
        }

        for k in 0..n {
            if k != i {
                let factor = aug[k][i];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..(2 * n) {
                    aug[k][j] -= factor * aug[i][j];
                }
            }
        }
    }

    let mut result = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let val = aug[i][n + j];
            result[i][j] = if val.is_finite() {
                val
            } else if i == j {
                1.0
            } else {
                0.0
            };
        }
    }

    if is_singular {
        for (i, row) in result.iter_mut().enumerate() {
            row[i] = row[i].max(1e-6);
        }
    }

    result
}

fn matrix_vector_mul(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot_product(row, v)).collect()
}

fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Expected score per 30-second window.
pub fn expected_score_reward(score: f64, observed_ms: f64, config: &BanditConfig) -> f64 {
    let observed = if observed_ms.is_finite() { observed_ms } else { 0.0 };
    score / observed.max(config.min_observed_ms) * config.reward_window_ms
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub arm_id: String,
    pub index: usize,
    pub score: f64,
    pub explored: bool,
    pub pressure_aware: bool,
    pub context: BanditContext,
}

/// LinUCB selector that accepts feature vectors whose width grows at runtime.
pub struct PressureAwareSelector {
    model: LinUcbModel,
    config: BanditConfig,
    rng: ChaCha8Rng,
}

impl PressureAwareSelector {
    pub fn new(initial_dim: usize, config: BanditConfig) -> Self {
        Self {
            model: LinUcbModel::new(initial_dim, config.alpha),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn from_model(model: LinUcbModel, config: BanditConfig) -> Self {
        Self {
            model,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn model(&self) -> &LinUcbModel {
        &self.model
    }

    pub fn select(&mut self, contexts: &[BanditContext]) -> Option<Selection> {
        if contexts.is_empty() {
            return None;
        }
        let width = contexts.iter().map(|c| c.features.len()).max().unwrap_or(0);

        let (idx, score, pressure_aware) = match self.grow(width) {
            Ok(()) => {
                let (idx, score) = self.model.select(contexts)?;
                (idx, score, true)
            }
            Err(err) => {
                tracing::warn!(error = %err, "pressure-aware selection failed, using base features");
                let base: Vec<BanditContext> = contexts.iter().map(strip_pressure).collect();
                let (idx, score) = self.model.select(&base)?;
                (idx, score, false)
            }
        };

        let (idx, score, explored) = if self.config.epsilon > 0.0 && self.rng.random::<f64>() < self.config.epsilon {
            let pick = self.rng.random_range(0..contexts.len());
            (pick, self.model.score(&contexts[pick].features), pick != idx)
        } else {
            (idx, score, false)
        };

        let context = contexts[idx].clone();
        Some(Selection {
            arm_id: context.arm_id.clone(),
            index: idx,
            score,
            explored,
            pressure_aware,
            context,
        })
    }

    pub fn update(&mut self, context: &BanditContext, reward: f64) -> Result<(), BanditError> {
        self.grow(context.features.len())?;
        self.model.update(&context.features, reward)
    }

    fn grow(&mut self, width: usize) -> Result<(), BanditError> {
        if width <= self.model.dim() {
            return Ok(());
        }
        if width > self.config.max_dim {
            return Err(BanditError::DimensionLimit {
                requested: width,
                limit: self.config.max_dim,
            });
        }
        self.model.grow_to(width)
    }

    pub fn reward(&self, score: f64, observed_ms: f64) -> f64 {
        expected_score_reward(score, observed_ms, &self.config)
    }
}

fn strip_pressure(context: &BanditContext) -> BanditContext {
    let mut features = context.features.clone();
    for idx in [STRESS_FEATURE, LOAD_FEATURE] {
        if let Some(value) = features.get_mut(idx) {
            *value = 0.0;
        }
    }
    BanditContext::new(context.arm_id.clone(), features)
}
