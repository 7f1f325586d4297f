//! Seeded K-means (Lloyd, with optional Elkan-style pruning).

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

/// Fitting stops once the summed centroid movement drops below this.
pub const TOLERANCE: f64 = 1e-4;

/// Relative slack on the Elkan bound so rounding never prunes a true winner.
const PRUNE_MARGIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Auto,
    Full,
    Elkan,
}

impl Algorithm {
    /// The strategy actually used; `Auto` runs plain Lloyd.
    pub fn resolve(self) -> Algorithm {
        match self {
            Algorithm::Auto => Algorithm::Full,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Auto => "auto",
            Algorithm::Full => "full",
            Algorithm::Elkan => "elkan",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = SegmentError;

    /// Accepts exactly the names the JSON form uses.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Algorithm::Auto),
            "full" => Ok(Algorithm::Full),
            "elkan" => Ok(Algorithm::Elkan),
            other => Err(SegmentError::InvalidParameter(format!(
                "unknown algorithm '{}' (expected auto, full or elkan)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    pub random_state: u64,
    pub algorithm: Algorithm,
}

/// Outcome of one converged (or iteration-capped) fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster id per input row.
    pub assignments: Vec<usize>,
    /// Row `i` is the centroid of cluster `i`.
    pub centroids: Array2<f64>,
    pub iterations: usize,
    pub inertia: f64,
}

impl KMeansFit {
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &label in &self.assignments {
            sizes[label] += 1;
        }
        sizes
    }
}

/// Euclidean distance between two rows.
#[inline]
pub fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    squared_euclidean(a, b).sqrt()
}

#[inline]
pub fn squared_euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Sum of squared distances from every row to its assigned centroid.
pub fn inertia(data: &Array2<f64>, assignments: &[usize], centroids: &Array2<f64>) -> f64 {
    data.outer_iter()
        .zip(assignments)
        .map(|(row, &c)| squared_euclidean(row, centroids.row(c)))
        .sum()
}

/// Fit `params.k` clusters to the rows of `data`.
pub fn fit(data: &Array2<f64>, params: &KMeansParams) -> Result<KMeansFit> {
    let nrows = data.nrows();
    let k = params.k;

    if k < 2 || k > nrows {
        return Err(SegmentError::InvalidParameter(format!(
            "number of clusters must satisfy 2 <= k <= {} (data points), got {}",
            nrows, k
        )));
    }
    if params.max_iterations == 0 {
        return Err(SegmentError::InvalidParameter(
            "max_iterations must be at least 1".to_string(),
        ));
    }

    let algorithm = params.algorithm.resolve();
    let mut centroids = initial_centroids(data, k, params.random_state);
    let mut assignments = vec![usize::MAX; nrows];
    let mut iterations = 0;

    for iter in 1..=params.max_iterations {
        iterations = iter;

        let mut changed = match algorithm {
            Algorithm::Elkan => assign_elkan(data, &centroids, &mut assignments),
            _ => assign_full(data, &centroids, &mut assignments),
        };
        if repair_empty_clusters(data, &mut centroids, &mut assignments) {
            changed = true;
        }

        let new_centroids = recompute_centroids(data, &assignments, k);
        let shift = (&centroids - &new_centroids)
            .iter()
            .map(|d| d * d)
            .sum::<f64>()
            .sqrt();
        centroids = new_centroids;

        debug!("iteration {}: changed={} shift={:.6}", iter, changed, shift);
        if !changed || shift < TOLERANCE {
            break;
        }
    }

    let inertia = inertia(data, &assignments, &centroids);
    Ok(KMeansFit {
        assignments,
        centroids,
        iterations,
        inertia,
    })
}

/// `k` distinct rows drawn with a seeded ChaCha stream, in draw order.
fn initial_centroids(data: &Array2<f64>, k: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let indices = rand::seq::index::sample(&mut rng, data.nrows(), k);

    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    for (ci, idx) in indices.iter().enumerate() {
        centroids.row_mut(ci).assign(&data.row(idx));
    }
    centroids
}

/// Nearest centroid, lowest id wins ties.
fn nearest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f64::INFINITY;
    for (ci, c_row) in centroids.outer_iter().enumerate() {
        let dist = squared_euclidean(point, c_row);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = ci;
        }
    }
    best_cluster
}

fn assign_full(data: &Array2<f64>, centroids: &Array2<f64>, assignments: &mut [usize]) -> bool {
    let mut changed = false;
    for (i, row) in data.outer_iter().enumerate() {
        let best = nearest(row, centroids);
        if assignments[i] != best {
            assignments[i] = best;
            changed = true;
        }
    }
    changed
}

/// Same result as [`assign_full`], skipping centroids ruled out by the
/// triangle inequality: if `d(c_best, c_j) > 2 d(x, c_best)` then
/// `d(x, c_j) > d(x, c_best)`.
fn assign_elkan(data: &Array2<f64>, centroids: &Array2<f64>, assignments: &mut [usize]) -> bool {
    let k = centroids.nrows();
    let mut between = Array2::<f64>::zeros((k, k));
    for a in 0..k {
        for b in (a + 1)..k {
            let d = euclidean(centroids.row(a), centroids.row(b));
            between[[a, b]] = d;
            between[[b, a]] = d;
        }
    }

    let mut changed = false;
    for (i, row) in data.outer_iter().enumerate() {
        let mut best_cluster = 0;
        let mut best_sq = squared_euclidean(row, centroids.row(0));
        for ci in 1..k {
            if between[[best_cluster, ci]] > 2.0 * best_sq.sqrt() * (1.0 + PRUNE_MARGIN) {
                continue;
            }
            let dist_sq = squared_euclidean(row, centroids.row(ci));
            if dist_sq < best_sq {
                best_sq = dist_sq;
                best_cluster = ci;
            }
        }
        if assignments[i] != best_cluster {
            assignments[i] = best_cluster;
            changed = true;
        }
    }
    changed
}

/// Give every empty cluster the point farthest from its own centroid, taken
/// from a cluster that can spare a member. Returns whether anything moved.
fn repair_empty_clusters(
    data: &Array2<f64>,
    centroids: &mut Array2<f64>,
    assignments: &mut [usize],
) -> bool {
    let k = centroids.nrows();
    let mut counts = vec![0usize; k];
    for &c in assignments.iter() {
        counts[c] += 1;
    }

    let mut moved = false;
    while let Some(empty) = counts.iter().position(|&c| c == 0) {
        let mut farthest = None;
        let mut farthest_dist = f64::NEG_INFINITY;
        for (i, row) in data.outer_iter().enumerate() {
            let own = assignments[i];
            if counts[own] < 2 {
                continue;
            }
            let dist = squared_euclidean(row, centroids.row(own));
            if dist > farthest_dist {
                farthest_dist = dist;
                farthest = Some(i);
            }
        }

        // k <= nrows, so some cluster always has a spare member here.
        let Some(idx) = farthest else { break };
        warn!("cluster {} is empty, reseeding it with point {}", empty, idx);

        counts[assignments[idx]] -= 1;
        assignments[idx] = empty;
        counts[empty] += 1;
        centroids.row_mut(empty).assign(&data.row(idx));
        moved = true;
    }
    moved
}

fn recompute_centroids(data: &Array2<f64>, assignments: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &c) in data.outer_iter().zip(assignments) {
        let mut target = sums.row_mut(c);
        target += &row;
        counts[c] += 1;
    }

    for (ci, mut row) in sums.outer_iter_mut().enumerate() {
        if counts[ci] > 0 {
            row.mapv_inplace(|x| x / counts[ci] as f64);
        }
    }
    sums
}
