//! Mall customer segmentation: CSV loading, seeded K-means, cluster metrics
//! and optimal-K search, served over a small JSON API.

pub mod dataset;
pub mod error;
pub mod features;
pub mod kmeans;
pub mod metrics;
pub mod optimal_k;
pub mod result;
pub mod server;
pub mod settings;
pub mod store;

use log::info;

pub use dataset::{CustomerRecord, Dataset, Gender};
pub use error::{Result, SegmentError};
pub use features::{Feature, FeatureMatrix};
pub use kmeans::{fit, Algorithm, KMeansFit, KMeansParams};
pub use metrics::{compute_metrics, ClusterMetric};
pub use optimal_k::{search, OptimalKReport};
pub use result::SegmentationResult;
pub use settings::{ModelSettings, OptimalKConfig, RecommendRule};
pub use store::SegmentationStore;

/// Features → K-means → metrics → response, for one set of settings.
pub fn segment(dataset: &Dataset, settings: &ModelSettings) -> Result<SegmentationResult> {
    let features = settings.validate()?;
    let fitted = FeatureMatrix::build(dataset, &features, settings.normalize)?;
    let raw = if settings.normalize {
        FeatureMatrix::raw(dataset, &features)?
    } else {
        fitted.clone()
    };

    let model = kmeans::fit(&fitted.data, &settings.kmeans_params())?;
    info!(
        "fitted k={} on {} customers in {} iterations (inertia {:.3})",
        model.k(),
        dataset.len(),
        model.iterations,
        model.inertia
    );

    let report = compute_metrics(dataset, &fitted, &raw, &model);
    Ok(SegmentationResult::assemble(dataset, settings, &fitted, &model, report))
}
