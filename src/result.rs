//! Response contract for a completed segmentation run.

use std::io::Write;

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Gender};
use crate::error::Result;
use crate::features::FeatureMatrix;
use crate::kmeans::{euclidean, Algorithm, KMeansFit};
use crate::metrics::{ClusterMetric, ClusterReport};
use crate::settings::ModelSettings;

/// Header written by [`SegmentationResult::write_csv`].
pub const EXPORT_HEADER: [&str; 6] = [
    "CustomerID",
    "Gender",
    "Age",
    "Annual Income",
    "Spending Score",
    "Cluster",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    pub customer_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub annual_income: f64,
    pub spending_score: f64,
    pub cluster: usize,
    /// Distance to the assigned centroid in the space the model was fitted in.
    pub distance_to_centroid: f64,
}

/// One entry of the unified point stream: a centroid or a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPoint {
    pub annual_income: f64,
    pub spending_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    pub cluster: usize,
    pub is_centroid: bool,
}

/// Metadata of one completed fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRun {
    pub algorithm: Algorithm,
    pub k: usize,
    pub max_iterations: usize,
    pub random_state: u64,
    pub normalize: bool,
    pub features: Vec<String>,
    pub iterations: usize,
    pub silhouette_score: Option<f64>,
    pub inertia: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationResult {
    pub customers: Vec<CustomerData>,
    pub clusters: Vec<ClusterPoint>,
    pub metrics: Vec<ClusterMetric>,
    pub model_info: ModelRun,
}

impl SegmentationResult {
    pub fn assemble(
        dataset: &Dataset,
        settings: &ModelSettings,
        fitted: &FeatureMatrix,
        fit: &KMeansFit,
        report: ClusterReport,
    ) -> Self {
        let customers = dataset
            .records
            .iter()
            .zip(fitted.data.outer_iter())
            .zip(&fit.assignments)
            .map(|((record, row), &cluster)| CustomerData {
                customer_id: record.customer_id,
                gender: record.gender,
                age: record.age,
                annual_income: record.annual_income,
                spending_score: record.spending_score,
                cluster,
                distance_to_centroid: euclidean(row, fit.centroids.row(cluster)),
            })
            .collect::<Vec<_>>();

        let centroids = report.metrics.iter().map(|m| ClusterPoint {
            annual_income: m.avg_income,
            spending_score: m.avg_spending,
            age: m.avg_age,
            cluster: m.cluster,
            is_centroid: true,
        });
        let points = customers.iter().map(|c| ClusterPoint {
            annual_income: c.annual_income,
            spending_score: c.spending_score,
            age: c.age.map(f64::from),
            cluster: c.cluster,
            is_centroid: false,
        });
        let clusters = centroids.chain(points).collect();

        let model_info = ModelRun {
            algorithm: settings.algorithm,
            k: fit.k(),
            max_iterations: settings.max_iterations,
            random_state: settings.random_state,
            normalize: settings.normalize,
            features: fitted.feature_names(),
            iterations: fit.iterations,
            silhouette_score: report.silhouette,
            inertia: fit.inertia,
        };

        Self {
            customers,
            clusters,
            metrics: report.metrics,
            model_info,
        }
    }

    /// Cluster id per customer, in dataset order.
    pub fn assignments(&self) -> Vec<usize> {
        self.customers.iter().map(|c| c.cluster).collect()
    }

    /// Write the customers of this run with their (1-based) cluster ids.
    ///
    /// Everything comes from `customers`, so the export always matches the
    /// run that produced it even if the dataset has since been replaced.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(EXPORT_HEADER)?;
        for customer in &self.customers {
            wtr.write_record([
                customer.customer_id.to_string(),
                customer.gender.map(|g| g.to_string()).unwrap_or_default(),
                customer.age.map(|a| a.to_string()).unwrap_or_default(),
                customer.annual_income.to_string(),
                customer.spending_score.to_string(),
                (customer.cluster + 1).to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
