//! Raster loading and band-math calculation.
//!
//! The batch corrector only talks to [`RasterEngine`]. [`NativeEngine`] reads
//! and writes GeoTIFF with the `tiff` crate; with the `gdal` feature,
//! `GdalEngine` delegates to GDAL instead.

pub mod calculator;
pub mod error;
pub mod native;

#[cfg(feature = "gdal")]
pub mod gdal_io;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::extent::Extent;

pub use error::{CalcError, EngineError, SUCCESS};
#[cfg(feature = "gdal")]
pub use gdal_io::GdalEngine;
pub use native::NativeEngine;

/// Output format token of GeoTIFF rasters.
pub const GTIFF: &str = "GTiff";

/// Metadata of a raster that loaded successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterLayer {
    pub path: PathBuf,
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub extent: Extent,
    pub band_count: usize,
    /// No-data value of band 1, if any.
    pub no_data: Option<f64>,
}

impl RasterLayer {
    /// Display name derived from the file name.
    pub fn layer_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

/// Binds an expression reference to one band of a raster.
#[derive(Debug, Clone)]
pub struct CalculatorEntry {
    pub reference: String,
    pub raster: RasterLayer,
    /// 1-based band index.
    pub band: usize,
}

/// Everything a raster calculation needs to produce one output raster.
#[derive(Debug, Clone)]
pub struct RasterCalculation {
    pub expression: String,
    pub output_path: PathBuf,
    pub format: String,
    pub extent: Extent,
    pub width: usize,
    pub height: usize,
    pub entries: Vec<CalculatorEntry>,
}

pub trait RasterEngine {
    /// Opens `path` as a raster layer. An `Err` marks the layer invalid.
    fn load(&self, path: &Path) -> Result<RasterLayer, EngineError>;

    /// Evaluates the calculation and writes its output raster.
    /// `Ok` corresponds to status [`SUCCESS`], errors carry a non-zero
    /// [`CalcError::code`].
    fn process(&self, calculation: &RasterCalculation) -> Result<(), CalcError>;
}

impl<E: RasterEngine + ?Sized> RasterEngine for &E {
    fn load(&self, path: &Path) -> Result<RasterLayer, EngineError> {
        (**self).load(path)
    }

    fn process(&self, calculation: &RasterCalculation) -> Result<(), CalcError> {
        (**self).process(calculation)
    }
}

impl<E: RasterEngine + ?Sized> RasterEngine for Box<E> {
    fn load(&self, path: &Path) -> Result<RasterLayer, EngineError> {
        (**self).load(path)
    }

    fn process(&self, calculation: &RasterCalculation) -> Result<(), CalcError> {
        (**self).process(calculation)
    }
}
