use tracing::debug;

use super::{CalcError, CalculatorEntry, GTIFF, RasterCalculation};
use crate::expression::Expression;

/// No-data value written to calculated rasters (-FLT_MAX).
pub const OUTPUT_NO_DATA: f32 = f32::MIN;

/// Pixel values of one band, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BandData {
    pub values: Vec<f64>,
    pub no_data: Option<f64>,
}

impl BandData {
    fn is_no_data(&self, idx: usize) -> bool {
        let value = self.values[idx];
        value.is_nan() || self.no_data.is_some_and(|nd| value == nd)
    }
}

/// Resolves every reference of `expression` to its calculator entry, in the
/// order the expression expects values.
pub fn bind_entries<'a>(
    expression: &Expression,
    entries: &'a [CalculatorEntry],
) -> Result<Vec<&'a CalculatorEntry>, CalcError> {
    expression
        .references()
        .iter()
        .map(|reference| {
            entries
                .iter()
                .find(|entry| entry.reference == *reference)
                .ok_or_else(|| {
                    CalcError::InputLayer(format!("no raster bound to reference '{}'", reference))
                })
        })
        .collect()
}

fn check_entry(entry: &CalculatorEntry, width: usize, height: usize) -> Result<(), CalcError> {
    let raster = &entry.raster;

    if entry.band == 0 || entry.band > raster.band_count {
        return Err(CalcError::Band(format!(
            "{} has {} band(s), band {} requested",
            raster.name, raster.band_count, entry.band
        )));
    }

    if raster.width != width || raster.height != height {
        return Err(CalcError::InputLayer(format!(
            "{} is {}x{}, calculation expects {}x{}",
            raster.name, raster.width, raster.height, width, height
        )));
    }

    Ok(())
}

/// Evaluates `expression` per pixel. A pixel is no-data in the output when
/// any input is no-data or the result is not finite.
pub fn evaluate(expression: &Expression, bands: &[BandData], len: usize) -> Vec<f32> {
    let mut inputs = vec![0.0; bands.len()];

    (0..len)
        .map(|idx| {
            if bands.iter().any(|band| band.is_no_data(idx)) {
                return OUTPUT_NO_DATA;
            }

            for (slot, band) in inputs.iter_mut().zip(bands) {
                *slot = band.values[idx];
            }

            let value = expression.evaluate(&inputs) as f32;
            if value.is_finite() { value } else { OUTPUT_NO_DATA }
        })
        .collect()
}

/// Validates `calculation`, reads each bound band with `read_band` and
/// returns the output pixels.
pub fn calculate<F>(calculation: &RasterCalculation, mut read_band: F) -> Result<Vec<f32>, CalcError>
where
    F: FnMut(&CalculatorEntry) -> Result<BandData, CalcError>,
{
    if calculation.format != GTIFF {
        return Err(CalcError::CreateOutput {
            path: calculation.output_path.clone(),
            reason: format!("unsupported output format '{}'", calculation.format),
        });
    }

    if calculation.width == 0 || calculation.height == 0 {
        return Err(CalcError::CreateOutput {
            path: calculation.output_path.clone(),
            reason: format!(
                "invalid output size {}x{}",
                calculation.width, calculation.height
            ),
        });
    }

    let expression = Expression::parse(&calculation.expression)?;
    let entries = bind_entries(&expression, &calculation.entries)?;

    let len = calculation.width * calculation.height;
    let mut bands = Vec::with_capacity(entries.len());

    for entry in entries {
        check_entry(entry, calculation.width, calculation.height)?;

        let band = read_band(entry)?;
        if band.values.len() != len {
            return Err(CalcError::Band(format!(
                "{} band {} holds {} values, expected {}",
                entry.raster.name,
                entry.band,
                band.values.len(),
                len
            )));
        }

        debug!(
            "Bound {} to band {} of {}",
            entry.reference, entry.band, entry.raster.name
        );
        bands.push(band);
    }

    Ok(evaluate(&expression, &bands, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RasterLayer;
    use crate::extent::Extent;
    use std::path::PathBuf;

    fn layer(width: usize, height: usize, band_count: usize) -> RasterLayer {
        RasterLayer {
            path: PathBuf::from("tile01.tif"),
            name: "tile01.tif".to_string(),
            width,
            height,
            extent: Extent::pixel_space(width, height),
            band_count,
            no_data: None,
        }
    }

    fn calculation(expression: &str, entries: Vec<CalculatorEntry>) -> RasterCalculation {
        RasterCalculation {
            expression: expression.to_string(),
            output_path: PathBuf::from("out.tif"),
            format: GTIFF.to_string(),
            extent: Extent::pixel_space(2, 2),
            width: 2,
            height: 2,
            entries,
        }
    }

    fn entry(band: usize, raster: RasterLayer) -> CalculatorEntry {
        CalculatorEntry {
            reference: "ndvi@1".to_string(),
            raster,
            band,
        }
    }

    #[test]
    fn test_linear_correction_per_pixel() {
        let calc = calculation("-0.001 + 1.021 * ndvi@1", vec![entry(1, layer(2, 2, 1))]);

        let out = calculate(&calc, |_| {
            Ok(BandData {
                values: vec![-1.0, 0.0, 0.5, 1.0],
                no_data: None,
            })
        })
        .unwrap();

        let expected: Vec<f32> = [-1.0, 0.0, 0.5, 1.0]
            .iter()
            .map(|x: &f64| (-0.001 + 1.021 * x) as f32)
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_no_data_propagates() {
        let calc = calculation("2 * ndvi@1", vec![entry(1, layer(2, 2, 1))]);

        let out = calculate(&calc, |_| {
            Ok(BandData {
                values: vec![-9999.0, f64::NAN, 0.25, 1.0],
                no_data: Some(-9999.0),
            })
        })
        .unwrap();

        assert_eq!(out, vec![OUTPUT_NO_DATA, OUTPUT_NO_DATA, 0.5, 2.0]);
    }

    #[test]
    fn test_unbound_reference() {
        let calc = calculation("red@1 * 2", vec![entry(1, layer(2, 2, 1))]);
        let err = calculate(&calc, |_| unreachable!()).unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn test_band_out_of_range() {
        let calc = calculation("ndvi@1", vec![entry(2, layer(2, 2, 1))]);
        let err = calculate(&calc, |_| unreachable!()).unwrap_err();
        assert!(matches!(err, CalcError::Band(_)));
        assert_eq!(err.code(), 6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let calc = calculation("ndvi@1", vec![entry(1, layer(3, 2, 1))]);
        let err = calculate(&calc, |_| unreachable!()).unwrap_err();
        assert!(matches!(err, CalcError::InputLayer(_)));
    }

    #[test]
    fn test_parse_error_and_format() {
        let calc = calculation("ndvi@1 +", vec![entry(1, layer(2, 2, 1))]);
        assert_eq!(calculate(&calc, |_| unreachable!()).unwrap_err().code(), 4);

        let mut calc = calculation("ndvi@1", vec![entry(1, layer(2, 2, 1))]);
        calc.format = "PNG".to_string();
        assert_eq!(calculate(&calc, |_| unreachable!()).unwrap_err().code(), 2);
    }
}
