pub mod corrector;
pub mod report;

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{RasterEngine, RasterLayer};
use crate::project::LayerSink;
use crate::scanner;

pub use corrector::{Corrector, FileOutcome};
pub use report::{BatchReport, CorrectedFile, FailedFile, FailureKind, Reporter};

/// Errors that abort a whole run. Per-file failures end up in the
/// [`BatchReport`] instead.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot create output folder {}: {source}", .path.display())]
    OutputFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot list input folder: {0}")]
    Scan(#[from] walkdir::Error),
}

#[derive(Debug)]
pub struct BatchRunner<E: RasterEngine> {
    config: Config,
    engine: E,
}

impl<E: RasterEngine> BatchRunner<E> {
    pub fn new(config: Config, engine: E) -> Self {
        BatchRunner { config, engine }
    }

    /// Re-opens a written raster so the sink sees it as stored on disk.
    fn register_output(&self, output: &std::path::Path, sink: &mut dyn LayerSink) {
        match self.engine.load(output) {
            Ok(layer) => sink.register(&layer),
            Err(e) => warn!(
                "Could not reload {} for registration: {}",
                RasterLayer::layer_name(output),
                e
            ),
        }
    }

    /// Corrects every matching raster of the input folder, one after the
    /// other. The output folder is created first, even if nothing matches.
    pub fn run<W: Write>(
        &self,
        sink: &mut dyn LayerSink,
        reporter: &mut Reporter<W>,
    ) -> Result<BatchReport, BatchError> {
        let output_folder = self.config.output_folder();
        fs::create_dir_all(output_folder).map_err(|source| BatchError::OutputFolder {
            path: output_folder.to_path_buf(),
            source,
        })?;

        let files = scanner::scan_directory(self.config.input_folder(), self.config.pattern())?;
        info!(
            "Found {} raster(s) in {}",
            files.len(),
            self.config.input_folder().display()
        );

        let corrector = Corrector::new(&self.engine, &self.config);
        info!(
            "Applying {} ({})",
            corrector.expression(),
            corrector.coefficients()
        );

        let mut report =
            BatchReport::new(corrector.expression().to_string(), corrector.coefficients());

        for input in files {
            reporter.processing(&RasterLayer::layer_name(&input));

            match corrector.correct(&input) {
                FileOutcome::Corrected { input, output } => {
                    reporter.saved(&output);
                    self.register_output(&output, sink);
                    report.corrected.push(CorrectedFile { input, output });
                }
                FileOutcome::Failed(failure) => {
                    reporter.failed(&failure);
                    report.failed.push(failure);
                }
            }
        }

        report.finished_at = Some(Utc::now());
        reporter.completed(&report);

        info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded_count(),
            report.failed_count()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use crate::project::{Discard, Project};
    use tempfile::tempdir;

    #[test]
    fn test_empty_input_creates_output_folder() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("NDVI");
        let output = dir.path().join("NDVI_Corrected");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("notes.txt"), b"not a raster").unwrap();

        let runner = BatchRunner::new(Config::new(&input, &output), NativeEngine);
        let mut reporter = Reporter::new(Vec::new());
        let report = runner.run(&mut Discard, &mut reporter).unwrap();

        assert!(output.is_dir());
        assert_eq!(report.succeeded_count(), 0);
        assert_eq!(report.failed_count(), 0);
        assert!(report.finished_at.is_some());

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("NDVI TM → ETM+ batch correction completed"));
    }

    #[test]
    fn test_missing_input_folder_aborts() {
        let dir = tempdir().unwrap();
        let runner = BatchRunner::new(
            Config::new(dir.path().join("missing"), dir.path().join("out")),
            NativeEngine,
        );
        let mut reporter = Reporter::new(Vec::new());
        let mut project = Project::new("NDVI");

        let result = runner.run(&mut project, &mut reporter);

        assert!(matches!(result, Err(BatchError::Scan(_))));
        assert!(reporter.into_inner().is_empty());
        assert!(project.layers().is_empty());
    }
}
