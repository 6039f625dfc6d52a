//! GeoTIFF reading and writing with the `tiff` crate.
//!
//! Georeferencing is limited to what single-band NDVI products carry:
//! `ModelPixelScale` + `ModelTiepoint` (or `ModelTransformation`), the GeoKey
//! directory with its parameter tags, and GDAL's no-data tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::Path;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;
use tracing::{debug, warn};

use super::calculator::{self, BandData, OUTPUT_NO_DATA};
use super::{CalcError, EngineError, RasterCalculation, RasterEngine, RasterLayer};
use crate::extent::Extent;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// GeoKey directory and parameter tags, copied verbatim between rasters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Vec<f64>,
    pub ascii: Option<String>,
}

impl GeoKeys {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Self {
        GeoKeys {
            directory: decoder
                .get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))
                .unwrap_or_default(),
            doubles: decoder
                .get_tag_f64_vec(tag(GEO_DOUBLE_PARAMS))
                .unwrap_or_default(),
            ascii: decoder
                .get_tag_ascii_string(tag(GEO_ASCII_PARAMS))
                .ok()
                .map(|s| s.trim_end_matches('\0').to_string()),
        }
    }
}

/// A single-band Float32 raster ready to be written as GeoTIFF.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    pub extent: Extent,
    pub geo_keys: GeoKeys,
    pub no_data: Option<f64>,
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let decoder = Decoder::new(BufReader::new(file)).map_err(|source| EngineError::Tiff {
        path: path.to_path_buf(),
        source,
    })?;

    // Full Landsat scenes exceed the default 256 MiB decoding buffer
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn samples_per_pixel(color_type: ColorType) -> usize {
    match color_type {
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        ColorType::Multiband { num_samples, .. } => num_samples as usize,
        _ => 1,
    }
}

/// Geotransform from the tiepoint/pixel-scale pair, falling back to the
/// affine model transformation.
fn read_geo_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<[f64; 6]> {
    if let (Ok(scale), Ok(tiepoint)) = (
        decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)),
        decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)),
    ) && scale.len() >= 2
        && tiepoint.len() >= 6
    {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some([origin_x, scale[0], 0.0, origin_y, 0.0, -scale[1]]);
    }

    if let Ok(matrix) = decoder.get_tag_f64_vec(tag(MODEL_TRANSFORMATION))
        && matrix.len() >= 8
    {
        return Some([matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5]]);
    }

    None
}

fn read_no_data<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(tag(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse().ok())
}

fn to_f64(result: DecodingResult, path: &Path) -> Result<Vec<f64>, EngineError> {
    let values = match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: "unsupported pixel format".to_string(),
            });
        }
    };

    Ok(values)
}

/// Reads band `band` (1-based) of the first image in `path`.
pub fn read_band(path: &Path, band: usize) -> Result<BandData, EngineError> {
    let mut decoder = open_decoder(path)?;
    let tiff_err = |source| EngineError::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let samples = samples_per_pixel(decoder.colortype().map_err(tiff_err)?);
    if band == 0 || band > samples {
        return Err(EngineError::Unsupported {
            path: path.to_path_buf(),
            reason: format!("band {} requested, raster has {}", band, samples),
        });
    }

    let no_data = read_no_data(&mut decoder);
    let interleaved = to_f64(decoder.read_image().map_err(tiff_err)?, path)?;

    let values = interleaved
        .into_iter()
        .skip(band - 1)
        .step_by(samples)
        .collect();

    Ok(BandData { values, no_data })
}

/// Writes `raster` as a single-band Float32 GeoTIFF.
pub fn write_geotiff(path: &Path, raster: &GeoRaster) -> Result<(), EngineError> {
    let io_err = |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tiff_err = |source| EngineError::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err)?;

    let mut image = encoder
        .new_image::<Gray32Float>(raster.width as u32, raster.height as u32)
        .map_err(tiff_err)?;

    let gt = raster.extent.to_geo_transform(raster.width, raster.height);
    let scale = [gt[1], -gt[5], 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt[0], gt[3], 0.0];

    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err)?;
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err)?;

    if raster.geo_keys.directory.is_empty() {
        // Version 1.1.0 with a single key: GTRasterTypeGeoKey = RasterPixelIsArea
        let minimal: [u16; 8] = [1, 1, 0, 1, 1025, 0, 1, 1];
        image
            .encoder()
            .write_tag(tag(GEO_KEY_DIRECTORY), &minimal[..])
            .map_err(tiff_err)?;
    } else {
        image
            .encoder()
            .write_tag(tag(GEO_KEY_DIRECTORY), raster.geo_keys.directory.as_slice())
            .map_err(tiff_err)?;
        if !raster.geo_keys.doubles.is_empty() {
            image
                .encoder()
                .write_tag(tag(GEO_DOUBLE_PARAMS), raster.geo_keys.doubles.as_slice())
                .map_err(tiff_err)?;
        }
        if let Some(ascii) = &raster.geo_keys.ascii {
            image
                .encoder()
                .write_tag(tag(GEO_ASCII_PARAMS), ascii.as_str())
                .map_err(tiff_err)?;
        }
    }

    if let Some(no_data) = raster.no_data {
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), format!("{:e}", no_data).as_str())
            .map_err(tiff_err)?;
    }

    image.write_data(&raster.data).map_err(tiff_err)?;

    Ok(())
}

/// Pure-Rust engine reading and writing GeoTIFF through the `tiff` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl RasterEngine for NativeEngine {
    fn load(&self, path: &Path) -> Result<RasterLayer, EngineError> {
        let mut decoder = open_decoder(path)?;
        let tiff_err = |source| EngineError::Tiff {
            path: path.to_path_buf(),
            source,
        };

        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        let (width, height) = (width as usize, height as usize);
        let band_count = samples_per_pixel(decoder.colortype().map_err(tiff_err)?);

        let extent = match read_geo_transform(&mut decoder) {
            Some(gt) => {
                if gt[2] != 0.0 || gt[4] != 0.0 {
                    warn!(
                        "{} has a rotated model transformation; rotation terms are dropped",
                        path.display()
                    );
                }
                Extent::from_geo_transform(gt, width, height).map_err(|reason| {
                    EngineError::Unsupported {
                        path: path.to_path_buf(),
                        reason,
                    }
                })?
            }
            None => Extent::pixel_space(width, height),
        };

        debug!(
            "Loaded {}: {}x{}, {} band(s), extent {}",
            path.display(),
            width,
            height,
            band_count,
            extent
        );

        Ok(RasterLayer {
            path: path.to_path_buf(),
            name: RasterLayer::layer_name(path),
            width,
            height,
            extent,
            band_count,
            no_data: read_no_data(&mut decoder),
        })
    }

    fn process(&self, calculation: &RasterCalculation) -> Result<(), CalcError> {
        let data = calculator::calculate(calculation, |entry| {
            read_band(&entry.raster.path, entry.band)
                .map_err(|e| CalcError::InputLayer(e.to_string()))
        })?;

        // CRS keys follow the first input
        let geo_keys = match calculation.entries.first() {
            Some(entry) => {
                let mut decoder = open_decoder(&entry.raster.path)
                    .map_err(|e| CalcError::InputLayer(e.to_string()))?;
                GeoKeys::read(&mut decoder)
            }
            None => GeoKeys::default(),
        };

        let raster = GeoRaster {
            width: calculation.width,
            height: calculation.height,
            data,
            extent: calculation.extent,
            geo_keys,
            no_data: Some(OUTPUT_NO_DATA as f64),
        };

        write_geotiff(&calculation.output_path, &raster).map_err(|e| CalcError::CreateOutput {
            path: calculation.output_path.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Coefficients;
    use crate::engine::{CalculatorEntry, GTIFF};
    use tempfile::tempdir;

    fn utm_extent() -> Extent {
        Extent::new(500000.0, 2399940.0, 500090.0, 2400000.0).unwrap()
    }

    fn utm_keys() -> GeoKeys {
        // Projected, PixelIsArea, EPSG:32644
        GeoKeys {
            directory: vec![1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 32644],
            doubles: Vec::new(),
            ascii: Some("WGS 84 / UTM zone 44N|".to_string()),
        }
    }

    fn write_fixture(path: &Path, data: Vec<f32>) {
        let raster = GeoRaster {
            width: 3,
            height: 2,
            data,
            extent: utm_extent(),
            geo_keys: utm_keys(),
            no_data: Some(-9999.0),
        };
        write_geotiff(path, &raster).unwrap();
    }

    #[test]
    fn test_load_reads_georeferencing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tile01.tif");
        write_fixture(&path, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        let layer = NativeEngine.load(&path).unwrap();

        assert_eq!(layer.name, "tile01.tif");
        assert_eq!((layer.width, layer.height), (3, 2));
        assert_eq!(layer.band_count, 1);
        assert!(layer.extent.approx_eq(&utm_extent(), 1e-6));
        assert_eq!(layer.no_data, Some(-9999.0));
    }

    #[test]
    fn test_read_band_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tile01.tif");
        write_fixture(&path, vec![-1.0, -0.5, 0.0, 0.25, 0.5, 1.0]);

        let band = read_band(&path, 1).unwrap();
        assert_eq!(band.values, vec![-1.0, -0.5, 0.0, 0.25, 0.5, 1.0]);
        assert!(read_band(&path, 2).is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();

        assert!(matches!(
            NativeEngine.load(&path),
            Err(EngineError::Tiff { .. })
        ));
        assert!(matches!(
            NativeEngine.load(&dir.path().join("missing.tif")),
            Err(EngineError::Io { .. })
        ));
    }

    #[test]
    fn test_process_writes_corrected_raster() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tile01.tif");
        let output = dir.path().join("tile01_ETM.tif");
        write_fixture(&input, vec![-9999.0, -0.5, 0.0, 0.25, 0.5, 1.0]);

        let layer = NativeEngine.load(&input).unwrap();
        let calculation = RasterCalculation {
            expression: "-0.001 + 1.021 * ndvi@1".to_string(),
            output_path: output.clone(),
            format: GTIFF.to_string(),
            extent: layer.extent,
            width: layer.width,
            height: layer.height,
            entries: vec![CalculatorEntry {
                reference: "ndvi@1".to_string(),
                raster: layer.clone(),
                band: 1,
            }],
        };

        NativeEngine.process(&calculation).unwrap();

        let corrected = NativeEngine.load(&output).unwrap();
        assert_eq!((corrected.width, corrected.height), (3, 2));
        assert!(corrected.extent.approx_eq(&layer.extent, 1e-6));
        assert_eq!(corrected.no_data, Some(OUTPUT_NO_DATA as f64));

        let band = read_band(&output, 1).unwrap();
        assert_eq!(band.values[0], OUTPUT_NO_DATA as f64);
        let coefficients = Coefficients::default();
        for (x, y) in [-0.5, 0.0, 0.25, 0.5, 1.0].iter().zip(&band.values[1..]) {
            assert!((y - coefficients.apply(*x)).abs() < 1e-6);
        }

        let mut decoder = open_decoder(&output).unwrap();
        assert_eq!(GeoKeys::read(&mut decoder), utm_keys());
    }

    #[test]
    fn test_process_reports_unwritable_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tile01.tif");
        write_fixture(&input, vec![0.0; 6]);

        let layer = NativeEngine.load(&input).unwrap();
        let calculation = RasterCalculation {
            expression: "ndvi@1".to_string(),
            output_path: dir.path().join("missing-dir").join("out.tif"),
            format: GTIFF.to_string(),
            extent: layer.extent,
            width: layer.width,
            height: layer.height,
            entries: vec![CalculatorEntry {
                reference: "ndvi@1".to_string(),
                raster: layer,
                band: 1,
            }],
        };

        let err = NativeEngine.process(&calculation).unwrap_err();
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn test_read_band_above_default_decoder_limit() {
        // 8200 x 8200 Float32 is about 269 MB, over the tiff crate's 256 MiB default
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene.tif");
        let (width, height) = (8200, 8200);
        let mut data = vec![0.25f32; width * height];
        data[width * height - 1] = -0.5;

        let raster = GeoRaster {
            width,
            height,
            data,
            extent: Extent::new(500000.0, 2154000.0, 746000.0, 2400000.0).unwrap(),
            geo_keys: utm_keys(),
            no_data: None,
        };
        write_geotiff(&path, &raster).unwrap();
        drop(raster);

        let band = read_band(&path, 1).unwrap();
        assert_eq!(band.values.len(), width * height);
        assert_eq!(band.values[0], 0.25);
        assert_eq!(band.values[width * height - 1], -0.5);
    }

    #[test]
    fn test_load_keeps_extent_of_rotated_transformation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 2).unwrap();
            // x = 100 + 10 * col + 1 * row, y = 200 + 0.5 * col - 10 * row
            let matrix: [f64; 16] = [
                10.0, 1.0, 0.0, 100.0, //
                0.5, -10.0, 0.0, 200.0, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ];
            image
                .encoder()
                .write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])
                .unwrap();
            image.write_data(&[0.1f32, 0.2, 0.3, 0.4]).unwrap();
        }

        let layer = NativeEngine.load(&path).unwrap();
        assert_eq!((layer.width, layer.height), (2, 2));
        assert!(
            layer
                .extent
                .approx_eq(&Extent::new(100.0, 180.0, 120.0, 200.0).unwrap(), 1e-9)
        );
    }
}
