//! Batch linear correction of NDVI GeoTIFFs, `y = a + b * x`, used to bring
//! Landsat 4/5 TM NDVI onto the Landsat 7 ETM+ scale.

pub mod batch;
pub mod config;
pub mod engine;
pub mod expression;
pub mod extent;
pub mod logger;
pub mod naming;
pub mod project;
pub mod scanner;

pub use batch::{BatchError, BatchReport, BatchRunner, Reporter};
pub use config::{Coefficients, Config};
pub use engine::{NativeEngine, RasterEngine};
