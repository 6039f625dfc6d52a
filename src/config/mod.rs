use glob::Pattern;
use serde::Deserialize;
use serde::Deserializer;
use serde::de::Error;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub mod error;
pub use error::ConfigError;

pub mod coefficients;
pub use coefficients::Coefficients;

/// Suffix inserted before the extension of every corrected file.
pub const DEFAULT_SUFFIX: &str = "_ETM";
/// Input selection, matched case-insensitively.
pub const DEFAULT_PATTERN: &str = "*.tif";

#[derive(Debug, Clone)]
pub struct Config {
    input_folder: PathBuf,
    output_folder: PathBuf,
    coefficients: Coefficients,
    suffix: String,
    pattern: Pattern,
}

fn validate_coefficients(coefficients: Coefficients) -> Result<Coefficients, ConfigError> {
    if !coefficients.is_finite() {
        return Err(ConfigError::Coefficients {
            a: coefficients.a,
            b: coefficients.b,
        });
    }
    Ok(coefficients)
}

fn validate_suffix(suffix: String) -> Result<String, ConfigError> {
    if suffix.is_empty() || suffix.contains(['/', '\\']) {
        return Err(ConfigError::Suffix(suffix));
    }
    Ok(suffix)
}

fn compile_pattern(pattern: &str) -> Result<Pattern, ConfigError> {
    Pattern::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

// Deserializes a Config, rejecting non-finite coefficients, unusable suffixes
// and malformed patterns at parse time.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConfigHelper {
            input_folder: PathBuf,
            output_folder: PathBuf,
            #[serde(default)]
            coefficients: Coefficients,
            suffix: Option<String>,
            pattern: Option<String>,
        }

        let helper = ConfigHelper::deserialize(deserializer)?;

        let coefficients = validate_coefficients(helper.coefficients).map_err(D::Error::custom)?;

        let suffix = validate_suffix(helper.suffix.unwrap_or_else(|| DEFAULT_SUFFIX.to_string()))
            .map_err(D::Error::custom)?;

        let pattern = compile_pattern(helper.pattern.as_deref().unwrap_or(DEFAULT_PATTERN))
            .map_err(D::Error::custom)?;

        Ok(Config {
            input_folder: helper.input_folder,
            output_folder: helper.output_folder,
            coefficients,
            suffix,
            pattern,
        })
    }
}

impl Config {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_folder: P, output_folder: Q) -> Self {
        Self {
            input_folder: input_folder.into(),
            output_folder: output_folder.into(),
            coefficients: Coefficients::default(),
            suffix: DEFAULT_SUFFIX.to_string(),
            // "*.tif" is a literal-only pattern and always compiles.
            pattern: Pattern::new(DEFAULT_PATTERN).unwrap_or_default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn with_input_folder<P: Into<PathBuf>>(mut self, input_folder: P) -> Self {
        self.input_folder = input_folder.into();
        self
    }

    pub fn with_output_folder<P: Into<PathBuf>>(mut self, output_folder: P) -> Self {
        self.output_folder = output_folder.into();
        self
    }

    pub fn with_coefficients(mut self, coefficients: Coefficients) -> Result<Self, ConfigError> {
        self.coefficients = validate_coefficients(coefficients)?;
        Ok(self)
    }

    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Result<Self, ConfigError> {
        self.suffix = validate_suffix(suffix.into())?;
        Ok(self)
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.pattern = compile_pattern(pattern)?;
        Ok(self)
    }

    pub fn input_folder(&self) -> &Path {
        &self.input_folder
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}
