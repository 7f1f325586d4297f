//! Elbow and silhouette search over a range of cluster counts.

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{Result, SegmentError};
use crate::features::FeatureMatrix;
use crate::kmeans;
use crate::metrics::silhouette_score;
use crate::settings::{OptimalKConfig, RecommendRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalKReport {
    pub k_values: Vec<usize>,
    pub inertia_values: Vec<f64>,
    /// `null` where the silhouette is undefined for that K.
    pub silhouette_values: Vec<Option<f64>>,
    pub optimal_k_elbow: usize,
    pub optimal_k_silhouette: usize,
    pub recommended_k: usize,
}

/// Fit every K in the configured range and pick the elbow, silhouette and
/// recommended cluster counts.
pub fn search(dataset: &Dataset, config: &OptimalKConfig) -> Result<OptimalKReport> {
    let features = config.validate()?;
    if dataset.len() < config.max_k {
        return Err(SegmentError::InsufficientData(format!(
            "{} customers cannot be split into up to {} clusters",
            dataset.len(),
            config.max_k
        )));
    }

    let matrix = FeatureMatrix::build(dataset, &features, config.model.normalize)?;
    let k_values: Vec<usize> = (config.min_k..=config.max_k).collect();
    info!(
        "searching K in {}..={} over {} customers",
        config.min_k,
        config.max_k,
        dataset.len()
    );

    // par_iter keeps the collected order aligned with k_values
    let fits: Vec<(f64, Option<f64>)> = k_values
        .par_iter()
        .map(|&k| {
            let fit = kmeans::fit(&matrix.data, &config.model.kmeans_params_for(k))?;
            let silhouette = silhouette_score(&matrix.data, &fit.assignments, k);
            Ok((fit.inertia, silhouette))
        })
        .collect::<Result<_>>()?;

    let (inertia_values, silhouette_values): (Vec<f64>, Vec<Option<f64>>) =
        fits.into_iter().unzip();

    let optimal_k_elbow = elbow(&k_values, &inertia_values);
    let optimal_k_silhouette =
        best_silhouette(&k_values, &silhouette_values).unwrap_or(optimal_k_elbow);
    let recommended_k = recommend(
        config.rule,
        optimal_k_elbow,
        best_silhouette(&k_values, &silhouette_values),
    );

    info!(
        "elbow K={}, silhouette K={}, recommended K={}",
        optimal_k_elbow, optimal_k_silhouette, recommended_k
    );

    Ok(OptimalKReport {
        k_values,
        inertia_values,
        silhouette_values,
        optimal_k_elbow,
        optimal_k_silhouette,
        recommended_k,
    })
}

/// K farthest from the chord joining the first and last points of the
/// inertia curve, both axes scaled to `[0, 1]`. Ties go to the smaller K;
/// fewer than three points or a flat curve give the first K.
pub fn elbow(k_values: &[usize], inertia: &[f64]) -> usize {
    let Some(&first_k) = k_values.first() else {
        return 0;
    };
    let n = k_values.len().min(inertia.len());
    if n < 3 {
        return first_k;
    }

    let k_span = (k_values[n - 1] - first_k) as f64;
    let i_span = inertia[0] - inertia[n - 1];
    if k_span <= 0.0 || i_span <= 0.0 {
        return first_k;
    }

    let mut best = first_k;
    let mut best_dist = f64::NEG_INFINITY;
    for (&k, &value) in k_values.iter().zip(inertia).take(n) {
        let x = (k - first_k) as f64 / k_span;
        let y = (value - inertia[n - 1]) / i_span;
        let dist = (x + y - 1.0).abs() / std::f64::consts::SQRT_2;
        if dist > best_dist {
            best_dist = dist;
            best = k;
        }
    }
    best
}

/// K with the largest defined silhouette, smaller K on ties.
pub fn best_silhouette(k_values: &[usize], silhouettes: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (&k, score) in k_values.iter().zip(silhouettes) {
        if let Some(s) = *score {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((k, s));
            }
        }
    }
    best.map(|(k, _)| k)
}

pub fn recommend(rule: RecommendRule, elbow_k: usize, silhouette_k: Option<usize>) -> usize {
    match (rule, silhouette_k) {
        (RecommendRule::Elbow, _) | (_, None) => elbow_k,
        (RecommendRule::Silhouette, Some(s)) => s,
        (RecommendRule::Mean, Some(s)) => (elbow_k + s + 1) / 2,
    }
}
