//! Error types for idwkit

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for idwkit operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{label}: missing required field(s): {missing:?}. Available fields: {available:?}")]
    MissingFields {
        label: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a rejected parameter (a caller mistake, not a runtime failure).
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Error::InvalidParameter { .. })
    }

    /// Whether this error reports a missing dataset file or field.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Error::MissingInput(_) | Error::MissingFields { .. })
    }
}

/// Result type alias for idwkit operations
pub type Result<T> = std::result::Result<T, Error>;
