use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("coefficients must be finite numbers (got a = {a}, b = {b})")]
    Coefficients { a: f64, b: f64 },

    #[error("suffix must be non-empty and must not contain path separators: {0:?}")]
    Suffix(String),

    #[error("invalid file pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("{0} is required")]
    Missing(&'static str),
}
