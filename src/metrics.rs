//! Per-cluster statistics and model quality scores.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::features::FeatureMatrix;
use crate::kmeans::{euclidean, KMeansFit};

const PREMIUM: &str = "Premium Shoppers: High income customers who spend generously";
const POTENTIAL: &str = "Potential Shoppers: High income customers who are conservative spenders";
const CAREFUL: &str = "Careful Shoppers: Budget-conscious customers who still spend significantly";
const VALUE: &str = "Value Shoppers: Budget-conscious customers who spend minimally";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetric {
    pub cluster: usize,
    pub size: usize,
    /// Fraction of all customers in this cluster.
    pub share: f64,
    pub avg_income: f64,
    pub avg_spending: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_age: Option<f64>,
    /// Compactness relative to the whole dataset, in `[0, 1]`.
    pub density: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silhouette: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_distribution: Option<BTreeMap<String, f64>>,
    pub description: String,
}

/// Metrics for every cluster plus the model-level silhouette.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub metrics: Vec<ClusterMetric>,
    pub silhouette: Option<f64>,
}

/// Label from the cluster's position against the dataset medians.
pub fn describe(
    avg_income: f64,
    avg_spending: f64,
    median_income: f64,
    median_spending: f64,
) -> &'static str {
    match (avg_income >= median_income, avg_spending >= median_spending) {
        (true, true) => PREMIUM,
        (true, false) => POTENTIAL,
        (false, true) => CAREFUL,
        (false, false) => VALUE,
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / n as f64
}

/// Per-point silhouette coefficients.
///
/// `None` when there are fewer than two clusters or any cluster has a single
/// member, since the intra-cluster distance is then undefined.
pub fn silhouette_samples(data: &Array2<f64>, assignments: &[usize], k: usize) -> Option<Vec<f64>> {
    if k < 2 {
        return None;
    }
    let mut sizes = vec![0usize; k];
    for &c in assignments {
        sizes[c] += 1;
    }
    if sizes.iter().any(|&s| s < 2) {
        return None;
    }

    let n = data.nrows();
    let mut scores = Vec::with_capacity(n);
    for i in 0..n {
        let mut sums = vec![0.0; k];
        for j in 0..n {
            if i != j {
                sums[assignments[j]] += euclidean(data.row(i), data.row(j));
            }
        }

        let own = assignments[i];
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        scores.push(if denom > 0.0 { (b - a) / denom } else { 0.0 });
    }
    Some(scores)
}

/// Mean silhouette coefficient over all points, in `[-1, 1]`.
pub fn silhouette_score(data: &Array2<f64>, assignments: &[usize], k: usize) -> Option<f64> {
    silhouette_samples(data, assignments, k).map(|s| mean(s.into_iter()))
}

/// Build one [`ClusterMetric`] per cluster.
///
/// `fitted` is the matrix the model was trained on, `raw` the same features
/// without standardization.
pub fn compute_metrics(
    dataset: &Dataset,
    fitted: &FeatureMatrix,
    raw: &FeatureMatrix,
    fit: &KMeansFit,
) -> ClusterReport {
    let k = fit.k();
    let n = dataset.len();
    let samples = silhouette_samples(&fitted.data, &fit.assignments, k);
    let silhouette = samples.as_ref().map(|s| mean(s.iter().copied()));

    let incomes: Vec<f64> = dataset.records.iter().map(|r| r.annual_income).collect();
    let spendings: Vec<f64> = dataset.records.iter().map(|r| r.spending_score).collect();
    let median_income = median(&incomes);
    let median_spending = median(&spendings);

    let spread = match raw.data.mean_axis(Axis(0)) {
        Some(global) => mean(raw.data.outer_iter().map(|row| euclidean(row, global.view()))),
        None => 0.0,
    };

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in fit.assignments.iter().enumerate() {
        members[c].push(i);
    }

    let metrics = members
        .iter()
        .enumerate()
        .map(|(cluster, idx)| {
            let size = idx.len();
            let records: Vec<_> = idx.iter().map(|&i| &dataset.records[i]).collect();

            let avg_income = mean(records.iter().map(|r| r.annual_income));
            let avg_spending = mean(records.iter().map(|r| r.spending_score));
            let avg_age = if records.iter().all(|r| r.age.is_some()) {
                Some(mean(records.iter().filter_map(|r| r.age.map(f64::from))))
            } else {
                None
            };

            let member_rows = raw.data.select(Axis(0), idx);
            let density = density(&member_rows, spread);
            let variance = sample_variance(&member_rows);

            let gender_distribution = if records.iter().all(|r| r.gender.is_some()) {
                let mut dist = BTreeMap::new();
                for gender in records.iter().filter_map(|r| r.gender) {
                    *dist.entry(gender.to_string()).or_insert(0.0) += 1.0 / size as f64;
                }
                Some(dist)
            } else {
                None
            };

            let cluster_silhouette = samples
                .as_ref()
                .map(|s| mean(idx.iter().map(|&i| s[i])));

            ClusterMetric {
                cluster,
                size,
                share: size as f64 / n as f64,
                avg_income,
                avg_spending,
                avg_age,
                density,
                silhouette: cluster_silhouette,
                variance,
                gender_distribution,
                description: describe(avg_income, avg_spending, median_income, median_spending)
                    .to_string(),
            }
        })
        .collect();

    ClusterReport { metrics, silhouette }
}

/// `spread / (spread + mean member distance to the member mean)`, clipped to `[0, 1]`.
fn density(members: &Array2<f64>, spread: f64) -> f64 {
    let Some(center) = members.mean_axis(Axis(0)) else {
        return 0.0;
    };
    let within = mean(members.outer_iter().map(|row| euclidean(row, center.view())));
    let total = spread + within;
    if total > 0.0 {
        (spread / total).clamp(0.0, 1.0)
    } else {
        1.0
    }
}

/// Mean over columns of the ddof=1 variance; `None` below two members.
fn sample_variance(members: &Array2<f64>) -> Option<f64> {
    if members.nrows() < 2 {
        return None;
    }
    let per_column: Array1<f64> = members.var_axis(Axis(0), 1.0);
    per_column.mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::kmeans::{fit, Algorithm, KMeansParams};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_describe_table() {
        assert_eq!(describe(80.0, 80.0, 50.0, 50.0), PREMIUM);
        assert_eq!(describe(80.0, 20.0, 50.0, 50.0), POTENTIAL);
        assert_eq!(describe(20.0, 80.0, 50.0, 50.0), CAREFUL);
        assert_eq!(describe(20.0, 20.0, 50.0, 50.0), VALUE);
        assert_eq!(describe(50.0, 50.0, 50.0, 50.0), PREMIUM);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_silhouette_two_blobs() {
        let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]];
        let score = silhouette_score(&data, &[0, 0, 1, 1], 2).unwrap();
        assert!(score > 0.9 && score <= 1.0);
    }

    #[test]
    fn test_silhouette_undefined_cases() {
        let data = array![[0.0, 0.0], [0.0, 1.0], [10.0, 10.0]];
        assert_eq!(silhouette_score(&data, &[0, 0, 1], 2), None);
        assert_eq!(silhouette_score(&data, &[0, 0, 0], 1), None);
    }

    #[test]
    fn test_cluster_metrics() {
        let ds = Dataset::from_csv_str(
            "CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)\n\
             1,Male,20,15,80\n\
             2,Female,22,16,82\n\
             3,Female,50,90,10\n\
             4,Female,52,92,12\n",
        )
        .unwrap();
        let features = [Feature::AnnualIncome, Feature::SpendingScore];
        let fitted = FeatureMatrix::build(&ds, &features, true).unwrap();
        let raw = FeatureMatrix::build(&ds, &features, false).unwrap();
        let params = KMeansParams {
            k: 2,
            max_iterations: 300,
            random_state: 42,
            algorithm: Algorithm::Auto,
        };
        let model = fit(&fitted.data, &params).unwrap();
        let report = compute_metrics(&ds, &fitted, &raw, &model);

        assert_eq!(report.metrics.iter().map(|m| m.size).sum::<usize>(), 4);
        let silhouette = report.silhouette.unwrap();
        assert!((-1.0..=1.0).contains(&silhouette));

        let low = report.metrics.iter().find(|m| m.avg_income < 50.0).unwrap();
        assert_abs_diff_eq!(low.avg_income, 15.5);
        assert_abs_diff_eq!(low.avg_age.unwrap(), 21.0);
        assert_eq!(low.description, CAREFUL);
        let genders = low.gender_distribution.as_ref().unwrap();
        assert_abs_diff_eq!(genders["Male"], 0.5);
        assert_abs_diff_eq!(genders.values().sum::<f64>(), 1.0, epsilon = 1e-12);

        let high = report.metrics.iter().find(|m| m.avg_income > 50.0).unwrap();
        assert_eq!(high.description, POTENTIAL);
        assert_eq!(high.gender_distribution.as_ref().unwrap().len(), 1);
        assert!(high.density > 0.5 && high.density <= 1.0);
        assert_abs_diff_eq!(high.share, 0.5);
    }

    #[test]
    fn test_density_bounds() {
        let tight = array![[1.0, 1.0], [1.0, 1.0]];
        assert_eq!(density(&tight, 0.0), 1.0);
        assert_eq!(density(&tight, 5.0), 1.0);
        let loose = array![[0.0, 0.0], [10.0, 0.0]];
        assert_abs_diff_eq!(density(&loose, 5.0), 0.5);
    }
}
