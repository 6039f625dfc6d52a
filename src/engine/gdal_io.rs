//! Raster engine backed by GDAL.

use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use std::path::Path;
use tracing::debug;

use super::calculator::{self, BandData, OUTPUT_NO_DATA};
use super::{CalcError, EngineError, GTIFF, RasterCalculation, RasterEngine, RasterLayer};
use crate::extent::Extent;

fn read_band(path: &Path, band: usize) -> Result<BandData, EngineError> {
    let dataset = Dataset::open(path)?;
    let rasterband = dataset.rasterband(band)?;
    let (width, height) = dataset.raster_size();

    let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    Ok(BandData {
        values: buffer.data().to_vec(),
        no_data: rasterband.no_data_value(),
    })
}

fn write_output(calculation: &RasterCalculation, data: Vec<f32>) -> Result<(), EngineError> {
    let driver = DriverManager::get_driver_by_name(GTIFF)?;
    let mut dataset = driver.create_with_band_type::<f32, _>(
        &calculation.output_path,
        calculation.width,
        calculation.height,
        1,
    )?;

    dataset.set_geo_transform(
        &calculation
            .extent
            .to_geo_transform(calculation.width, calculation.height),
    )?;

    // CRS follows the first input
    if let Some(entry) = calculation.entries.first() {
        let source = Dataset::open(&entry.raster.path)?;
        let projection = source.projection();
        if !projection.is_empty() {
            dataset.set_projection(&projection)?;
        }
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(OUTPUT_NO_DATA as f64))?;

    let mut buffer = Buffer::new((calculation.width, calculation.height), data);
    band.write((0, 0), (calculation.width, calculation.height), &mut buffer)?;

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GdalEngine;

impl RasterEngine for GdalEngine {
    fn load(&self, path: &Path) -> Result<RasterLayer, EngineError> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();

        let extent = match dataset.geo_transform() {
            Ok(gt) => Extent::from_geo_transform(gt, width, height).map_err(|reason| {
                EngineError::Unsupported {
                    path: path.to_path_buf(),
                    reason,
                }
            })?,
            Err(_) => Extent::pixel_space(width, height),
        };

        let band_count = dataset.raster_count();
        let no_data = if band_count > 0 {
            dataset.rasterband(1)?.no_data_value()
        } else {
            None
        };

        debug!(
            "Opened {} with GDAL: {}x{}, {} band(s)",
            path.display(),
            width,
            height,
            band_count
        );

        Ok(RasterLayer {
            path: path.to_path_buf(),
            name: RasterLayer::layer_name(path),
            width,
            height,
            extent,
            band_count,
            no_data,
        })
    }

    fn process(&self, calculation: &RasterCalculation) -> Result<(), CalcError> {
        let data = calculator::calculate(calculation, |entry| {
            read_band(&entry.raster.path, entry.band)
                .map_err(|e| CalcError::InputLayer(e.to_string()))
        })?;

        write_output(calculation, data).map_err(|e| CalcError::CreateOutput {
            path: calculation.output_path.clone(),
            reason: e.to_string(),
        })
    }
}
