use serde::{Deserialize, Serialize};
use std::fmt;

/// Intercept of the TM to ETM+ NDVI cross-calibration.
pub const ETM_INTERCEPT: f64 = -0.001;
/// Slope of the TM to ETM+ NDVI cross-calibration.
pub const ETM_SLOPE: f64 = 1.021;

/// Linear correction `y = a + b * x`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            a: ETM_INTERCEPT,
            b: ETM_SLOPE,
        }
    }
}

impl Coefficients {
    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite()
    }

    pub fn apply(&self, x: f64) -> f64 {
        self.a + self.b * x
    }
}

impl fmt::Display for Coefficients {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a = {}, b = {}", self.a, self.b)
    }
}
