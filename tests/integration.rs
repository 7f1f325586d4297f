//! Integration tests for mall_segments

use std::io::Write;

use approx::assert_abs_diff_eq;
use mall_segments::{
    fit, optimal_k, segment, Algorithm, Dataset, Feature, FeatureMatrix, KMeansParams,
    ModelSettings, OptimalKConfig, SegmentError, SegmentationStore,
};
use tempfile::NamedTempFile;

const HEADER: &str = "CustomerID,Gender,Age,Annual Income (k$),Spending Score (1-100)";

/// Create a test CSV file with sample data
fn create_test_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

fn five_customers() -> NamedTempFile {
    create_test_csv(&[
        "1,Male,19,15,39",
        "2,Male,21,15,81",
        "3,Female,20,16,6",
        "4,Female,23,16,77",
        "5,Female,31,17,40",
    ])
}

/// Two well separated groups of 20 customers each.
fn two_blobs() -> Dataset {
    let mut text = format!("{}\n", HEADER);
    for i in 0..20 {
        let gender = if i % 2 == 0 { "Male" } else { "Female" };
        text.push_str(&format!("{},{},{},{},{}\n", i + 1, gender, 25 + i, 15 + i % 5, 10 + i / 5));
    }
    for i in 0..20 {
        let gender = if i % 3 == 0 { "Male" } else { "Female" };
        text.push_str(&format!(
            "{},{},{},{},{}\n",
            i + 21,
            gender,
            40 + i,
            120 + i % 5,
            85 + i / 5
        ));
    }
    Dataset::from_csv_str(&text).unwrap()
}

fn params(k: usize, seed: u64) -> KMeansParams {
    KMeansParams {
        k,
        max_iterations: 300,
        random_state: seed,
        algorithm: Algorithm::Auto,
    }
}

#[test]
fn test_five_point_scenario() {
    let file = five_customers();
    let ds = Dataset::from_csv_path(file.path()).unwrap();
    let features = [Feature::AnnualIncome, Feature::SpendingScore];
    let matrix = FeatureMatrix::build(&ds, &features, false).unwrap();

    let first = fit(&matrix.data, &params(2, 42)).unwrap();
    assert!(first.iterations <= 300);
    assert_eq!(first.assignments.len(), 5);
    assert!(first.cluster_sizes().iter().all(|&s| s > 0));

    let second = fit(&matrix.data, &params(2, 42)).unwrap();
    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.centroids, second.centroids);
}

#[test]
fn test_every_k_covers_all_points_with_nonempty_clusters() {
    let ds = Dataset::sample(7);
    let features = [Feature::AnnualIncome, Feature::SpendingScore, Feature::Age];
    let matrix = FeatureMatrix::build(&ds, &features, true).unwrap();
    for k in 2..=10 {
        for seed in [0, 42, 1234] {
            let model = fit(&matrix.data, &params(k, seed)).unwrap();
            let sizes = model.cluster_sizes();
            assert_eq!(sizes.len(), k);
            assert!(sizes.iter().all(|&s| s > 0), "k={} seed={}", k, seed);
            assert_eq!(sizes.iter().sum::<usize>(), ds.len());
            assert!(model.assignments.iter().all(|&c| c < k));
        }
    }
}

#[test]
fn test_feature_pipeline_is_idempotent() {
    let ds = Dataset::sample(3);
    let features = [Feature::SpendingScore, Feature::AnnualIncome];
    let a = FeatureMatrix::build(&ds, &features, true).unwrap();
    let b = FeatureMatrix::build(&ds, &features, true).unwrap();
    assert_eq!(a.data, b.data);
    for column in a.data.columns() {
        assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_segmentation_result_invariants() {
    let ds = two_blobs();
    for clusters in 2..=6 {
        let settings = ModelSettings {
            clusters,
            features: vec!["annual_income".into(), "spending_score".into(), "age".into()],
            ..Default::default()
        };
        let result = segment(&ds, &settings).unwrap();
        assert_eq!(result.customers.len(), ds.len());
        assert_eq!(result.metrics.len(), clusters);
        assert_eq!(result.metrics.iter().map(|m| m.size).sum::<usize>(), ds.len());
        if let Some(s) = result.model_info.silhouette_score {
            assert!((-1.0..=1.0).contains(&s));
        }
        for metric in &result.metrics {
            assert!((0.0..=1.0).contains(&metric.density));
            if let Some(genders) = &metric.gender_distribution {
                assert_abs_diff_eq!(genders.values().sum::<f64>(), 1.0, epsilon = 1e-9);
            }
        }
    }
}

#[test]
fn test_optimal_k_two_blobs_prefers_two() {
    let ds = two_blobs();
    let config = OptimalKConfig {
        min_k: 2,
        max_k: 5,
        ..Default::default()
    };
    let report = optimal_k::search(&ds, &config).unwrap();
    assert_eq!(report.k_values, vec![2, 3, 4, 5]);
    assert_eq!(report.optimal_k_silhouette, 2);
    assert_eq!(report.recommended_k, 2);
}

#[test]
fn test_missing_spending_column() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "CustomerID,Gender,Age,Annual Income (k$)").unwrap();
    writeln!(file, "1,Male,19,15").unwrap();

    let err = Dataset::from_csv_path(file.path()).unwrap_err();
    assert!(matches!(err, SegmentError::Parse(_)));
    assert!(err.to_string().contains("Spending Score"));
}

#[test]
fn test_single_cluster_request_rejected() {
    let file = five_customers();
    let ds = Dataset::from_csv_path(file.path()).unwrap();
    let settings = ModelSettings {
        clusters: 1,
        ..Default::default()
    };
    assert!(matches!(segment(&ds, &settings), Err(SegmentError::InvalidParameter(_))));
}

#[test]
fn test_no_result_after_fresh_load() {
    let store = SegmentationStore::new();
    let file = five_customers();
    store.load(Dataset::from_csv_path(file.path()).unwrap()).unwrap();
    assert!(matches!(store.segmentation(), Err(SegmentError::NoResult(_))));
}

#[test]
fn test_export_round_trip() {
    let store = SegmentationStore::new();
    let file = five_customers();
    store.load(Dataset::from_csv_path(file.path()).unwrap()).unwrap();
    store
        .run_model(&ModelSettings {
            clusters: 2,
            ..Default::default()
        })
        .unwrap();

    let csv = store.export_csv().unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("CustomerID,Gender,Age,Annual Income,Spending Score,Cluster")
    );
    let clusters: Vec<usize> = lines
        .map(|l| l.rsplit(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(clusters.len(), 5);
    assert!(clusters.iter().all(|&c| c == 1 || c == 2));
}
