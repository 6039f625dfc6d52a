use std::path::{Path, PathBuf};
use tracing::{debug, error};

use super::report::{FailedFile, FailureKind};
use crate::config::{Coefficients, Config};
use crate::engine::{CalculatorEntry, GTIFF, RasterCalculation, RasterEngine, RasterLayer};
use crate::expression::{self, NDVI_REFERENCE};
use crate::naming;

#[derive(Debug)]
pub enum FileOutcome {
    Corrected { input: PathBuf, output: PathBuf },
    Failed(FailedFile),
}

/// Applies the linear correction to one raster at a time.
pub struct Corrector<'a, E: RasterEngine> {
    engine: E,
    output_folder: &'a Path,
    suffix: &'a str,
    coefficients: Coefficients,
    expression: String,
}

impl<'a, E: RasterEngine> Corrector<'a, E> {
    pub fn new(engine: E, config: &'a Config) -> Self {
        let coefficients = config.coefficients();
        Self {
            engine,
            output_folder: config.output_folder(),
            suffix: config.suffix(),
            coefficients,
            expression: expression::linear(&coefficients, NDVI_REFERENCE),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    fn calculation(&self, layer: RasterLayer, output_path: PathBuf) -> RasterCalculation {
        RasterCalculation {
            expression: self.expression.clone(),
            output_path,
            format: GTIFF.to_string(),
            extent: layer.extent,
            width: layer.width,
            height: layer.height,
            entries: vec![CalculatorEntry {
                reference: NDVI_REFERENCE.to_string(),
                raster: layer,
                band: 1,
            }],
        }
    }

    /// Loads `input`, evaluates the correction and writes the output raster.
    /// Failures are returned as outcomes, never raised.
    pub fn correct(&self, input: &Path) -> FileOutcome {
        let name = RasterLayer::layer_name(input);
        let failed = |kind, message: String| {
            FileOutcome::Failed(FailedFile {
                name: name.clone(),
                input: input.to_path_buf(),
                kind,
                message,
            })
        };

        let Some(output_path) = naming::output_path(input, self.output_folder, self.suffix) else {
            return failed(
                FailureKind::Calculation { code: 2 },
                format!("cannot derive an output name for {}", input.display()),
            );
        };

        let layer = match self.engine.load(input) {
            Ok(layer) => layer,
            Err(e) => {
                error!("Failed to load {}: {}", name, e);
                return failed(FailureKind::Load, e.to_string());
            }
        };

        debug!("Evaluating '{}' into {}", self.expression, output_path.display());

        match self.engine.process(&self.calculation(layer, output_path.clone())) {
            Ok(()) => FileOutcome::Corrected {
                input: input.to_path_buf(),
                output: output_path,
            },
            Err(e) => {
                error!("Error processing {} (code {}): {}", name, e.code(), e);
                failed(FailureKind::Calculation { code: e.code() }, e.to_string())
            }
        }
    }
}
