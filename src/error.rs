use thiserror::Error;

/// Errors surfaced by the segmentation engine and its HTTP front.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Malformed upload: bad CSV, missing mandatory column, bad cell value.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Too few customers for the requested K range.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("no segmentation result available: {0}")]
    NoResult(String),

    /// Another upload or run holds the run gate.
    #[error("busy: {0}")]
    Busy(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SegmentError {
    /// Short machine-readable name used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SegmentError::Parse(_) | SegmentError::Csv(_) => "ParseError",
            SegmentError::InvalidFeature(_) => "InvalidFeatureError",
            SegmentError::InvalidParameter(_) => "InvalidParameterError",
            SegmentError::InsufficientData(_) => "InsufficientDataError",
            SegmentError::NoResult(_) => "NoResultError",
            SegmentError::Busy(_) => "Busy",
            SegmentError::Io(_) => "IoError",
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            SegmentError::Parse(_)
            | SegmentError::Csv(_)
            | SegmentError::InvalidFeature(_)
            | SegmentError::InvalidParameter(_) => 400,
            SegmentError::NoResult(_) => 404,
            SegmentError::Busy(_) => 409,
            SegmentError::InsufficientData(_) => 422,
            SegmentError::Io(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;
