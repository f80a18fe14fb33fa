//! Seeded, iteration-bounded RANSAC over any [`Estimator`].
//!
//! The loop never panics: when no consensus is found the returned
//! [`RansacResult`] has `model == None`. The iteration count is capped by
//! [`RansacOptions::max_iters`] and shrinks adaptively once a good inlier
//! ratio is observed, which keeps the worst-case latency of a fit bounded.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// RANSAC tuning parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacOptions {
    /// Hard upper bound on iterations.
    pub max_iters: usize,
    /// Inlier residual threshold, in the units of [`Estimator::residual`].
    pub thresh: f64,
    /// Minimum consensus size for a model to be accepted.
    pub min_inliers: usize,
    /// Probability in `[0, 1]` of drawing at least one outlier-free sample.
    pub confidence: f64,
    pub seed: u64,
    /// Refit the model on its consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            thresh: 0.5,
            min_inliers: 3,
            confidence: 0.90,
            seed: 1_234_567,
            refit_on_inliers: true,
        }
    }
}

/// Best consensus found by [`ransac`].
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<usize>,
    /// RMS residual over the inliers.
    pub inlier_rms: f64,
    /// Iterations actually run.
    pub iters: usize,
}

impl<M> RansacResult<M> {
    pub fn success(&self) -> bool {
        self.model.is_some()
    }
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

/// A model that can be hypothesized from a minimal sample and scored per datum.
pub trait Estimator {
    type Datum;
    type Model;

    /// Size of a minimal sample.
    const MIN_SAMPLES: usize;

    /// Fit from the sampled indices; `None` for degenerate samples.
    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum against a model.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Refit on a consensus set. Default keeps the hypothesis.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

struct Consensus {
    inliers: Vec<usize>,
    rms: f64,
}

fn consensus<E: Estimator>(data: &[E::Datum], model: &E::Model, thresh: f64) -> Consensus {
    let mut inliers = Vec::new();
    let mut sum_sq = 0.0;
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            sum_sq += r * r;
        }
    }
    let rms = if inliers.is_empty() {
        f64::INFINITY
    } else {
        (sum_sq / inliers.len() as f64).sqrt()
    };
    Consensus { inliers, rms }
}

/// Iterations needed to hit `confidence` given the current inlier ratio,
/// clamped to `[done, max_iters]`.
fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    done: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let log_outlier_sample = (1.0 - inlier_ratio.powi(min_samples as i32))
        .max(1e-12)
        .ln();
    if log_outlier_sample >= 0.0 {
        return max_iters;
    }
    let needed = ((1.0 - confidence).ln() / log_outlier_sample).ceil() as usize;
    needed.clamp(done, max_iters)
}

/// Run RANSAC for estimator `E` over `data`.
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    let mut best = RansacResult::default();
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let indices: Vec<usize> = (0..data.len()).collect();
    let mut sample = Vec::with_capacity(E::MIN_SAMPLES);
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut budget = opts.max_iters;
    let mut iters = 0;

    while iters < budget {
        iters += 1;
        sample.clear();
        sample.extend(indices.choose_multiple(&mut rng, E::MIN_SAMPLES).copied());

        let Some(mut model) = E::fit(data, &sample) else {
            continue;
        };
        let mut scored = consensus::<E>(data, &model, opts.thresh);
        if scored.inliers.len() < opts.min_inliers {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refined) = E::refit(data, &scored.inliers) {
                scored = consensus::<E>(data, &refined, opts.thresh);
                model = refined;
            }
        }

        let better = best.model.is_none()
            || scored.inliers.len() > best.inliers.len()
            || (scored.inliers.len() == best.inliers.len() && scored.rms < best.inlier_rms);
        if better {
            let ratio = scored.inliers.len() as f64 / data.len() as f64;
            best.model = Some(model);
            best.inliers = scored.inliers;
            best.inlier_rms = scored.rms;
            budget = adaptive_iterations(
                opts.confidence,
                ratio,
                E::MIN_SAMPLES,
                iters,
                opts.max_iters,
            );
        }
    }

    best.iters = iters;
    best
}
