//! Consensus Scorer — fits a rank-1 bias model over every rating in the snapshot.
//!
//! Prediction for rater `r` on note `n`:
//!
//! ```text
//! μ + note_intercept[n] + rater_intercept[r] + note_factor[n] * rater_factor[r]
//! ```
//!
//! The objective is squared error over observed ratings plus L2 penalties on every
//! intercept and factor, and on μ (scaled by the rating count so μ stays a small
//! offset and intercepts keep their meaning on the absolute rating scale).
//!
//! Fitting is alternating least squares: each pass solves every rater's
//! (intercept, factor) pair exactly with notes held fixed, then every note's pair
//! with raters held fixed, then μ. Each block step is an exact minimizer so the
//! objective never increases, and the loop stops when the improvement drops
//! below `convergence_tolerance` or `max_iterations` passes have run.
//!
//! Determinism: notes and raters are indexed in sorted order, observations are
//! summed in that order, and the initial note factors come from a fixed-seed
//! sequence. The same rating set therefore always reproduces the same
//! parameters bit for bit, including the sign of the factors.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::rating::Rating;
use crate::scoring::params::ScoringConfig;

const FACTOR_SEED: u64 = 0x5EED_C0DE_2024_0001;
const INITIAL_FACTOR_SCALE: f64 = 0.1;

// ────────────────────────────────────────────────────────────────────────────
// Output types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteParams {
    pub intercept: f64,
    pub factor: f64,
    /// Distinct raters behind the estimate.
    pub rating_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaterParams {
    pub intercept: f64,
    pub factor: f64,
    pub rating_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub notes: BTreeMap<Uuid, NoteParams>,
    pub raters: BTreeMap<String, RaterParams>,
    pub global_bias: f64,
    /// Full passes actually run.
    pub iterations: u32,
    /// False when the iteration ceiling was hit before the tolerance was met.
    pub converged: bool,
    /// Final value of the regularized objective.
    pub loss: f64,
    /// Observations that entered the fit, after de-duplication.
    pub ratings_used: usize,
    /// Self-ratings dropped before fitting.
    pub ratings_skipped: usize,
}

impl FitResult {
    fn empty(ratings_skipped: usize) -> Self {
        Self {
            notes: BTreeMap::new(),
            raters: BTreeMap::new(),
            global_bias: 0.0,
            iterations: 0,
            converged: true,
            loss: 0.0,
            ratings_used: 0,
            ratings_skipped,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observation matrix
// ────────────────────────────────────────────────────────────────────────────

struct Observation {
    note: usize,
    rater: usize,
    value: f64,
}

struct RatingMatrix {
    note_ids: Vec<Uuid>,
    rater_dids: Vec<String>,
    observations: Vec<Observation>,
    by_note: Vec<Vec<usize>>,
    by_rater: Vec<Vec<usize>>,
    skipped: usize,
}

impl RatingMatrix {
    /// Collapses the snapshot to one observation per (note, rater), newest wins,
    /// and drops ratings by a note's own author.
    fn build(ratings: &[Rating]) -> Self {
        let mut skipped = 0;
        let mut latest: BTreeMap<(Uuid, &str), &Rating> = BTreeMap::new();

        for rating in ratings {
            if rating.is_self_rating() {
                skipped += 1;
                continue;
            }
            let key = (rating.note_id, rating.rater_did.as_str());
            match latest.get(&key) {
                Some(existing) if !supersedes(rating, existing) => {}
                _ => {
                    latest.insert(key, rating);
                }
            }
        }

        let mut note_index: BTreeMap<Uuid, usize> = BTreeMap::new();
        let mut rater_index: BTreeMap<&str, usize> = BTreeMap::new();
        for (note_id, rater_did) in latest.keys() {
            note_index.entry(*note_id).or_insert(0);
            rater_index.entry(*rater_did).or_insert(0);
        }
        for (i, slot) in note_index.values_mut().enumerate() {
            *slot = i;
        }
        for (i, slot) in rater_index.values_mut().enumerate() {
            *slot = i;
        }

        let note_ids: Vec<Uuid> = note_index.keys().copied().collect();
        let rater_dids: Vec<String> = rater_index.keys().map(|d| d.to_string()).collect();

        let mut by_note = vec![Vec::new(); note_ids.len()];
        let mut by_rater = vec![Vec::new(); rater_dids.len()];
        let mut observations = Vec::with_capacity(latest.len());

        for ((note_id, rater_did), rating) in &latest {
            let note = note_index[note_id];
            let rater = rater_index[rater_did];
            by_note[note].push(observations.len());
            by_rater[rater].push(observations.len());
            observations.push(Observation {
                note,
                rater,
                value: rating.helpfulness.value(),
            });
        }

        Self {
            note_ids,
            rater_dids,
            observations,
            by_note,
            by_rater,
            skipped,
        }
    }
}

/// Newer timestamp wins; equal timestamps fall back to the higher value so the
/// outcome never depends on snapshot order.
fn supersedes(candidate: &Rating, existing: &Rating) -> bool {
    match candidate.updated_at.cmp(&existing.updated_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate.helpfulness.value() > existing.helpfulness.value(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fit
// ────────────────────────────────────────────────────────────────────────────

struct Params {
    global_bias: f64,
    note_intercept: Vec<f64>,
    note_factor: Vec<f64>,
    rater_intercept: Vec<f64>,
    rater_factor: Vec<f64>,
}

impl Params {
    fn initial(notes: usize, raters: usize) -> Self {
        Self {
            global_bias: 0.0,
            note_intercept: vec![0.0; notes],
            note_factor: (0..notes).map(initial_factor).collect(),
            rater_intercept: vec![0.0; raters],
            rater_factor: vec![0.0; raters],
        }
    }

    fn predict(&self, obs: &Observation) -> f64 {
        self.global_bias
            + self.note_intercept[obs.note]
            + self.rater_intercept[obs.rater]
            + self.note_factor[obs.note] * self.rater_factor[obs.rater]
    }
}

/// Fits the model over `ratings` and returns per-note parameters for every note
/// with at least one usable rating.
pub fn fit(ratings: &[Rating], config: &ScoringConfig) -> FitResult {
    let matrix = RatingMatrix::build(ratings);
    if matrix.observations.is_empty() {
        return FitResult::empty(matrix.skipped);
    }

    let mut params = Params::initial(matrix.note_ids.len(), matrix.rater_dids.len());
    let bias_lambda = config.global_bias_lambda * matrix.observations.len() as f64;

    let mut loss = objective(&matrix, &params, config, bias_lambda);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;
        update_raters(&matrix, &mut params, config);
        update_notes(&matrix, &mut params, config);
        update_global_bias(&matrix, &mut params, bias_lambda);

        let next = objective(&matrix, &params, config, bias_lambda);
        let improvement = loss - next;
        loss = next;
        if improvement < config.convergence_tolerance {
            converged = true;
            break;
        }
    }

    let notes = matrix
        .note_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            (
                *id,
                NoteParams {
                    intercept: params.note_intercept[i],
                    factor: params.note_factor[i],
                    rating_count: matrix.by_note[i].len() as u32,
                },
            )
        })
        .collect();

    let raters = matrix
        .rater_dids
        .iter()
        .enumerate()
        .map(|(i, did)| {
            (
                did.clone(),
                RaterParams {
                    intercept: params.rater_intercept[i],
                    factor: params.rater_factor[i],
                    rating_count: matrix.by_rater[i].len() as u32,
                },
            )
        })
        .collect();

    FitResult {
        notes,
        raters,
        global_bias: params.global_bias,
        iterations,
        converged,
        loss,
        ratings_used: matrix.observations.len(),
        ratings_skipped: matrix.skipped,
    }
}

fn update_raters(matrix: &RatingMatrix, params: &mut Params, config: &ScoringConfig) {
    for rater in 0..matrix.rater_dids.len() {
        let mut sums = RidgeSums::default();
        for &k in &matrix.by_rater[rater] {
            let obs = &matrix.observations[k];
            let target = obs.value - params.global_bias - params.note_intercept[obs.note];
            sums.add(target, params.note_factor[obs.note]);
        }
        let (intercept, factor) = sums.solve(config.intercept_lambda, config.factor_lambda);
        params.rater_intercept[rater] = intercept;
        params.rater_factor[rater] = factor;
    }
}

fn update_notes(matrix: &RatingMatrix, params: &mut Params, config: &ScoringConfig) {
    for note in 0..matrix.note_ids.len() {
        let mut sums = RidgeSums::default();
        for &k in &matrix.by_note[note] {
            let obs = &matrix.observations[k];
            let target = obs.value - params.global_bias - params.rater_intercept[obs.rater];
            sums.add(target, params.rater_factor[obs.rater]);
        }
        let (intercept, factor) = sums.solve(config.intercept_lambda, config.factor_lambda);
        params.note_intercept[note] = intercept;
        params.note_factor[note] = factor;
    }
}

fn update_global_bias(matrix: &RatingMatrix, params: &mut Params, bias_lambda: f64) {
    let residual: f64 = matrix
        .observations
        .iter()
        .map(|obs| obs.value - (params.predict(obs) - params.global_bias))
        .sum();
    params.global_bias = residual / (matrix.observations.len() as f64 + bias_lambda);
}

fn objective(
    matrix: &RatingMatrix,
    params: &Params,
    config: &ScoringConfig,
    bias_lambda: f64,
) -> f64 {
    let squared_error: f64 = matrix
        .observations
        .iter()
        .map(|obs| (obs.value - params.predict(obs)).powi(2))
        .sum();
    let intercepts: f64 = params
        .note_intercept
        .iter()
        .chain(&params.rater_intercept)
        .map(|v| v * v)
        .sum();
    let factors: f64 = params
        .note_factor
        .iter()
        .chain(&params.rater_factor)
        .map(|v| v * v)
        .sum();

    squared_error
        + config.intercept_lambda * intercepts
        + config.factor_lambda * factors
        + bias_lambda * params.global_bias * params.global_bias
}

/// Accumulates the normal equations for one entity's (intercept, factor) pair:
/// minimize Σ (t − a − b·x)² + λa·a² + λb·b².
#[derive(Default)]
struct RidgeSums {
    n: f64,
    x: f64,
    xx: f64,
    t: f64,
    tx: f64,
}

impl RidgeSums {
    fn add(&mut self, target: f64, feature: f64) {
        self.n += 1.0;
        self.x += feature;
        self.xx += feature * feature;
        self.t += target;
        self.tx += target * feature;
    }

    fn solve(&self, intercept_lambda: f64, factor_lambda: f64) -> (f64, f64) {
        let a11 = self.n + intercept_lambda;
        let a12 = self.x;
        let a22 = self.xx + factor_lambda;
        // n·Σx² ≥ (Σx)² and both lambdas are positive, so det > 0.
        let det = a11 * a22 - a12 * a12;
        let intercept = (self.t * a22 - a12 * self.tx) / det;
        let factor = (a11 * self.tx - a12 * self.t) / det;
        (intercept, factor)
    }
}

/// Fixed-seed splitmix64 draw mapped into ±`INITIAL_FACTOR_SCALE`.
fn initial_factor(index: usize) -> f64 {
    let mut z = FACTOR_SEED
        .wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let unit = (z >> 11) as f64 / (1u64 << 53) as f64;
    (unit * 2.0 - 1.0) * INITIAL_FACTOR_SCALE
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
