//! Validated run configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};
use crate::features::Feature;
use crate::kmeans::{Algorithm, KMeansParams};

pub const MIN_CLUSTERS: usize = 2;
pub const MAX_CLUSTERS: usize = 10;
pub const MIN_ITERATIONS: usize = 100;
pub const MAX_ITERATIONS: usize = 1000;

/// Settings for one run-model request. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub clusters: usize,
    pub max_iterations: usize,
    pub algorithm: Algorithm,
    pub random_state: u64,
    pub normalize: bool,
    pub features: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            clusters: 5,
            max_iterations: 300,
            algorithm: Algorithm::Auto,
            random_state: 42,
            normalize: true,
            features: vec![
                Feature::AnnualIncome.as_str().to_string(),
                Feature::SpendingScore.as_str().to_string(),
            ],
        }
    }
}

impl ModelSettings {
    /// Decode a JSON body, reporting bad shapes as parameter errors.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SegmentError::InvalidParameter(format!("invalid model settings: {}", e)))
    }

    /// Check ranges and resolve feature names.
    pub fn validate(&self) -> Result<Vec<Feature>> {
        if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&self.clusters) {
            return Err(SegmentError::InvalidParameter(format!(
                "clusters must be within [{}, {}], got {}",
                MIN_CLUSTERS, MAX_CLUSTERS, self.clusters
            )));
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(SegmentError::InvalidParameter(format!(
                "maxIterations must be within [{}, {}], got {}",
                MIN_ITERATIONS, MAX_ITERATIONS, self.max_iterations
            )));
        }
        Feature::parse_list(&self.features)
    }

    pub fn kmeans_params(&self) -> KMeansParams {
        self.kmeans_params_for(self.clusters)
    }

    pub fn kmeans_params_for(&self, k: usize) -> KMeansParams {
        KMeansParams {
            k,
            max_iterations: self.max_iterations,
            random_state: self.random_state,
            algorithm: self.algorithm,
        }
    }
}

/// How the elbow and silhouette picks combine into one recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendRule {
    /// Silhouette pick, elbow when no silhouette is defined.
    #[default]
    Silhouette,
    Elbow,
    /// Average of both, rounded half up.
    Mean,
}

/// Candidate range and fit settings for the optimal-K search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimalKConfig {
    pub min_k: usize,
    pub max_k: usize,
    pub rule: RecommendRule,
    #[serde(skip)]
    pub model: ModelSettings,
}

impl Default for OptimalKConfig {
    fn default() -> Self {
        Self {
            min_k: 2,
            max_k: 10,
            rule: RecommendRule::Silhouette,
            model: ModelSettings::default(),
        }
    }
}

impl OptimalKConfig {
    pub fn validate(&self) -> Result<Vec<Feature>> {
        if self.min_k < MIN_CLUSTERS || self.min_k > self.max_k || self.max_k > MAX_CLUSTERS {
            return Err(SegmentError::InvalidParameter(format!(
                "K range must satisfy {} <= minK <= maxK <= {}, got {}..={}",
                MIN_CLUSTERS, MAX_CLUSTERS, self.min_k, self.max_k
            )));
        }
        if self.model.max_iterations == 0 {
            return Err(SegmentError::InvalidParameter(
                "maxIterations must be at least 1".to_string(),
            ));
        }
        Feature::parse_list(&self.model.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let s = ModelSettings::from_json(json!({"clusters": 3})).unwrap();
        assert_eq!(s.clusters, 3);
        assert_eq!(s.max_iterations, 300);
        assert_eq!(s.random_state, 42);
        assert!(s.normalize);
        assert_eq!(s.validate().unwrap(), vec![Feature::AnnualIncome, Feature::SpendingScore]);
    }

    #[test]
    fn test_frontend_payload() {
        let s = ModelSettings::from_json(json!({
            "clusters": 4,
            "maxIterations": 500,
            "algorithm": "elkan",
            "randomState": 7,
            "normalize": false,
            "features": ["annual_income", "spending_score", "age"]
        }))
        .unwrap();
        assert_eq!(s.algorithm, Algorithm::Elkan);
        assert_eq!(s.validate().unwrap().len(), 3);
        assert_eq!(s.kmeans_params().k, 4);
    }

    #[test]
    fn test_out_of_range() {
        let one = ModelSettings { clusters: 1, ..Default::default() };
        assert!(matches!(one.validate(), Err(SegmentError::InvalidParameter(_))));
        let eleven = ModelSettings { clusters: 11, ..Default::default() };
        assert!(eleven.validate().is_err());
        let iters = ModelSettings { max_iterations: 50, ..Default::default() };
        assert!(iters.validate().is_err());
    }

    #[test]
    fn test_bad_json_is_parameter_error() {
        let err = ModelSettings::from_json(json!({"algorithm": "magic"})).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidParameter(_)));
        let err = ModelSettings::from_json(json!({"randomState": -1})).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidParameter(_)));
    }

    #[test]
    fn test_optimal_k_range() {
        assert!(OptimalKConfig::default().validate().is_ok());
        let bad = OptimalKConfig { min_k: 5, max_k: 3, ..Default::default() };
        assert!(bad.validate().is_err());
        let one = OptimalKConfig { min_k: 1, ..Default::default() };
        assert!(one.validate().is_err());
    }

    #[test]
    fn test_optimal_k_upper_bound() {
        let ten = OptimalKConfig { max_k: MAX_CLUSTERS, ..Default::default() };
        assert!(ten.validate().is_ok());
        let huge = OptimalKConfig { max_k: 200, ..Default::default() };
        assert!(matches!(huge.validate(), Err(SegmentError::InvalidParameter(_))));
    }
}
