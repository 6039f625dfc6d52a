use std::path::PathBuf;
use thiserror::Error;

use crate::expression::ExpressionError;

/// Status reported for a calculation that wrote its output.
pub const SUCCESS: i32 = 0;

/// Raised when a raster cannot be opened as a layer.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode TIFF {}: {source}", .path.display())]
    Tiff {
        path: PathBuf,
        source: tiff::TiffError,
    },

    #[error("Unsupported raster {}: {reason}", .path.display())]
    Unsupported { path: PathBuf, reason: String },

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Raised when a calculation does not produce its output raster.
/// Every variant maps to a non-zero status code.
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Cannot create output {}: {reason}", .path.display())]
    CreateOutput { path: PathBuf, reason: String },

    #[error("Input layer error: {0}")]
    InputLayer(String),

    #[error("Expression error: {0}")]
    Parser(#[from] ExpressionError),

    #[error("Band error: {0}")]
    Band(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}

impl CalcError {
    pub fn code(&self) -> i32 {
        match self {
            CalcError::CreateOutput { .. } => 2,
            CalcError::InputLayer(_) => 3,
            CalcError::Parser(_) => 4,
            CalcError::Band(_) => 6,
            CalcError::Calculation(_) => 7,
        }
    }
}
