use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::Coefficients;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Load,
    Calculation { code: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub name: String,
    pub input: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedFile {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub expression: String,
    pub coefficients: Coefficients,
    pub corrected: Vec<CorrectedFile>,
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    pub fn new(expression: String, coefficients: Coefficients) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            expression,
            coefficients,
            corrected: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.corrected.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn outputs(&self) -> Vec<&Path> {
        self.corrected.iter().map(|c| c.output.as_path()).collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(io::Error::other)
    }
}

/// Console status lines: one per processed file plus a completion line.
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: std::fmt::Arguments) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!("Could not write status line: {}", e);
        }
    }

    pub fn processing(&mut self, name: &str) {
        self.line(format_args!("Processing: {}", name));
    }

    pub fn saved(&mut self, output: &Path) {
        self.line(format_args!("✓ Saved: {}", output.display()));
    }

    pub fn failed(&mut self, failure: &FailedFile) {
        match failure.kind {
            FailureKind::Load => self.line(format_args!("✗ Failed to load {}", failure.name)),
            FailureKind::Calculation { code } => self.line(format_args!(
                "✗ Error processing {} (code {})",
                failure.name, code
            )),
        }
    }

    pub fn completed(&mut self, report: &BatchReport) {
        self.line(format_args!(
            "NDVI TM → ETM+ batch correction completed: {} succeeded, {} failed",
            report.succeeded_count(),
            report.failed_count()
        ));
        if let Err(e) = self.out.flush() {
            warn!("Could not flush status output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines() {
        let mut report = BatchReport::new("x".to_string(), Coefficients::default());
        report.corrected.push(CorrectedFile {
            input: PathBuf::from("in/tile01.tif"),
            output: PathBuf::from("out/tile01_ETM.tif"),
        });
        let failure = FailedFile {
            name: "corrupt.tif".to_string(),
            input: PathBuf::from("in/corrupt.tif"),
            kind: FailureKind::Load,
            message: "not a TIFF".to_string(),
        };
        report.failed.push(failure.clone());

        let mut reporter = Reporter::new(Vec::new());
        reporter.processing("tile01.tif");
        reporter.saved(Path::new("out/tile01_ETM.tif"));
        reporter.processing("corrupt.tif");
        reporter.failed(&failure);
        reporter.failed(&FailedFile {
            kind: FailureKind::Calculation { code: 2 },
            ..failure
        });
        reporter.completed(&report);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Processing: tile01.tif",
                "✓ Saved: out/tile01_ETM.tif",
                "Processing: corrupt.tif",
                "✗ Failed to load corrupt.tif",
                "✗ Error processing corrupt.tif (code 2)",
                "NDVI TM → ETM+ batch correction completed: 1 succeeded, 1 failed",
            ]
        );
    }

    #[test]
    fn test_report_json() {
        let mut report = BatchReport::new("-0.001 + 1.021 * ndvi@1".to_string(), Coefficients::default());
        report.failed.push(FailedFile {
            name: "b.tif".to_string(),
            input: PathBuf::from("in/b.tif"),
            kind: FailureKind::Calculation { code: 3 },
            message: "band".to_string(),
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["expression"], "-0.001 + 1.021 * ndvi@1");
        assert_eq!(json["coefficients"]["b"], 1.021);
        assert_eq!(json["failed"][0]["kind"]["calculation"]["code"], 3);
        assert_eq!(report.failed_names(), vec!["b.tif"]);
    }
}
