//! Feature selection and standardization.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::{CustomerRecord, Dataset};
use crate::error::{Result, SegmentError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Age,
    AnnualIncome,
    SpendingScore,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::AnnualIncome => "annual_income",
            Feature::SpendingScore => "spending_score",
        }
    }

    /// Raw value for one record; `None` only for a missing age.
    fn value(&self, record: &CustomerRecord) -> Option<f64> {
        match self {
            Feature::Age => record.age.map(f64::from),
            Feature::AnnualIncome => Some(record.annual_income),
            Feature::SpendingScore => Some(record.spending_score),
        }
    }

    /// Parse an ordered list of names; rejects empty lists, unknown and repeated names.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Feature>> {
        if names.is_empty() {
            return Err(SegmentError::InvalidFeature(
                "at least one feature must be selected".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let feature: Feature = name.as_ref().parse()?;
            if out.contains(&feature) {
                return Err(SegmentError::InvalidFeature(format!(
                    "feature '{}' requested more than once",
                    feature
                )));
            }
            out.push(feature);
        }
        Ok(out)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "age" => Ok(Feature::Age),
            "annual_income" => Ok(Feature::AnnualIncome),
            "spending_score" => Ok(Feature::SpendingScore),
            other => Err(SegmentError::InvalidFeature(format!(
                "unknown feature '{}' (expected age, annual_income or spending_score)",
                other
            ))),
        }
    }
}

/// Column statistics used to standardize a matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    pub mean: Array1<f64>,
    /// Population standard deviation; zero for constant columns.
    pub std: Array1<f64>,
}

/// Rows aligned with `Dataset::records`, columns in `features` order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub features: Vec<Feature>,
    pub data: Array2<f64>,
    /// Present when the matrix was standardized.
    pub scaling: Option<Scaling>,
}

impl FeatureMatrix {
    pub fn build(dataset: &Dataset, features: &[Feature], normalize: bool) -> Result<Self> {
        let raw = Self::raw(dataset, features)?;
        if normalize {
            Ok(raw.standardized())
        } else {
            Ok(raw)
        }
    }

    /// Un-standardized matrix for the given features.
    pub fn raw(dataset: &Dataset, features: &[Feature]) -> Result<Self> {
        if features.is_empty() {
            return Err(SegmentError::InvalidFeature(
                "at least one feature must be selected".to_string(),
            ));
        }

        let mut data = Array2::<f64>::zeros((dataset.len(), features.len()));
        for (i, record) in dataset.records.iter().enumerate() {
            for (j, feature) in features.iter().enumerate() {
                data[[i, j]] = feature.value(record).ok_or_else(|| {
                    SegmentError::InvalidFeature(format!(
                        "feature '{}' requested but customer {} has no value",
                        feature, record.customer_id
                    ))
                })?;
            }
        }

        Ok(Self {
            features: features.to_vec(),
            data,
            scaling: None,
        })
    }

    fn standardized(self) -> Self {
        let n = self.data.nrows() as f64;
        let mut mean = Array1::<f64>::zeros(self.data.ncols());
        let mut std = Array1::<f64>::zeros(self.data.ncols());

        for (j, column) in self.data.axis_iter(Axis(1)).enumerate() {
            let m = column.iter().sum::<f64>() / n;
            let var = column.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
            mean[j] = m;
            std[j] = var.sqrt();
        }

        let mut data = self.data;
        for mut row in data.outer_iter_mut() {
            for j in 0..row.len() {
                row[j] -= mean[j];
                if std[j] > 0.0 {
                    row[j] /= std[j];
                }
            }
        }

        Self {
            features: self.features,
            data,
            scaling: Some(Scaling { mean, std }),
        }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.as_str().to_string()).collect()
    }
}
