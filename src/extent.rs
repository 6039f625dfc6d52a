use serde::{Deserialize, Serialize};
use std::fmt;

/// Spatial extent of a raster in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, String> {
        if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
            return Err("Extent coordinates must be finite".to_string());
        }

        if xmin > xmax || ymin > ymax {
            return Err("Min values must be <= max values".to_string());
        }

        Ok(Extent {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }

    /// Extent of a raster without georeferencing: one map unit per pixel,
    /// origin at the top-left corner.
    pub fn pixel_space(width: usize, height: usize) -> Self {
        Extent {
            xmin: 0.0,
            ymin: 0.0,
            xmax: width as f64,
            ymax: height as f64,
        }
    }

    /// Builds the extent covered by `width` x `height` pixels of a GDAL style
    /// geotransform `[origin_x, pixel_w, rot, origin_y, rot, pixel_h]`.
    /// Rotation terms are ignored.
    pub fn from_geo_transform(gt: [f64; 6], width: usize, height: usize) -> Result<Self, String> {
        let x0 = gt[0];
        let x1 = gt[0] + gt[1] * width as f64;
        let y0 = gt[3];
        let y1 = gt[3] + gt[5] * height as f64;

        Extent::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// North-up geotransform mapping `width` x `height` pixels onto this extent.
    pub fn to_geo_transform(&self, width: usize, height: usize) -> [f64; 6] {
        [
            self.xmin,
            self.width() / width.max(1) as f64,
            0.0,
            self.ymax,
            0.0,
            -self.height() / height.max(1) as f64,
        ]
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn approx_eq(&self, other: &Extent, tolerance: f64) -> bool {
        (self.xmin - other.xmin).abs() <= tolerance
            && (self.ymin - other.ymin).abs() <= tolerance
            && (self.xmax - other.xmax).abs() <= tolerance
            && (self.ymax - other.ymax).abs() <= tolerance
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} : {},{}",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}
