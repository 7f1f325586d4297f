//! Process-wide dataset and current result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use log::info;

use crate::dataset::Dataset;
use crate::error::{Result, SegmentError};
use crate::optimal_k::{self, OptimalKReport};
use crate::result::SegmentationResult;
use crate::settings::{ModelSettings, OptimalKConfig};

/// Seed for the synthetic dataset used before any upload.
pub const SAMPLE_SEED: u64 = 42;

/// Upload summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UploadSummary {
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Holds the loaded dataset and the most recent result.
///
/// Uploads and runs are serialized by a single gate; a second caller while
/// the gate is held gets [`SegmentError::Busy`] instead of waiting.
#[derive(Debug, Default)]
pub struct SegmentationStore {
    dataset: RwLock<Option<Arc<Dataset>>>,
    result: RwLock<Option<Arc<SegmentationResult>>>,
    gate: Mutex<()>,
}

impl SegmentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, what: &str) -> Result<MutexGuard<'_, ()>> {
        match self.gate.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(SegmentError::Busy(format!(
                "cannot {} while another upload or run is in progress",
                what
            ))),
        }
    }

    /// Replace the dataset and drop any result computed from the old one.
    pub fn load(&self, dataset: Dataset) -> Result<UploadSummary> {
        let _gate = self.acquire("load data")?;
        let summary = UploadSummary {
            rows: dataset.len(),
            columns: dataset.columns.clone(),
        };
        *self.dataset.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(dataset));
        *self.result.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("dataset replaced: {} rows", summary.rows);
        Ok(summary)
    }

    pub fn load_csv(&self, text: &str) -> Result<UploadSummary> {
        let dataset = Dataset::from_csv_str(text)?;
        self.load(dataset)
    }

    pub fn dataset(&self) -> Option<Arc<Dataset>> {
        self.dataset.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn has_result(&self) -> bool {
        self.result.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Current dataset, installing the synthetic sample when none was uploaded.
    /// Callers must hold the gate.
    fn dataset_or_sample(&self) -> Arc<Dataset> {
        let mut slot = self.dataset.write().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            info!("no dataset uploaded, using sample data");
            Arc::new(Dataset::sample(SAMPLE_SEED))
        })
        .clone()
    }

    /// Run the full pipeline and keep the result as current.
    pub fn run_model(&self, settings: &ModelSettings) -> Result<Arc<SegmentationResult>> {
        let _gate = self.acquire("run the model")?;
        let dataset = self.dataset_or_sample();
        let result = Arc::new(crate::segment(&dataset, settings)?);
        *self.result.write().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
        Ok(result)
    }

    pub fn optimal_k(&self, config: &OptimalKConfig) -> Result<OptimalKReport> {
        let _gate = self.acquire("search for K")?;
        let dataset = self.dataset_or_sample();
        optimal_k::search(&dataset, config)
    }

    pub fn segmentation(&self) -> Result<Arc<SegmentationResult>> {
        self.result
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SegmentError::NoResult("no model has been run yet".to_string()))
    }

    /// Customers of the current result and their 1-based clusters as CSV text.
    pub fn export_csv(&self) -> Result<String> {
        let result = self.segmentation()?;
        let mut out = Vec::new();
        result.write_csv(&mut out)?;
        String::from_utf8(out).map_err(|e| SegmentError::Io(std::io::Error::other(e)))
    }
}
