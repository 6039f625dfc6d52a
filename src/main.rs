use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[cfg(feature = "gdal")]
use tm2etm::engine::GdalEngine;
use tm2etm::batch::{BatchRunner, Reporter};
use tm2etm::config::{Coefficients, Config, ConfigError};
use tm2etm::engine::{NativeEngine, RasterEngine};
use tm2etm::logger;
use tm2etm::project::{Discard, LayerSink, Project};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineKind {
    /// Pure-Rust GeoTIFF reader/writer
    Native,
    /// GDAL raster I/O
    #[cfg(feature = "gdal")]
    Gdal,
}

#[derive(Parser, Debug)]
#[command(name = "tm2etm")]
#[command(version, about = "Batch TM → ETM+ linear correction of NDVI GeoTIFFs", long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder holding the NDVI rasters to correct
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Folder receiving the corrected rasters (created if absent)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Intercept `a` of y = a + b * x
    #[arg(short = 'a', long, allow_hyphen_values = true)]
    intercept: Option<f64>,

    /// Slope `b` of y = a + b * x
    #[arg(short = 'b', long, allow_hyphen_values = true)]
    slope: Option<f64>,

    /// Suffix inserted before the extension of corrected files
    #[arg(long)]
    suffix: Option<String>,

    /// Raster engine
    #[arg(short, long, value_enum, default_value = "native")]
    engine: EngineKind,

    /// Register corrected rasters in this JSON project file
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Write a JSON run report
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let input = cli.input.clone().ok_or(ConfigError::Missing("--input"))?;
            let output = cli.output.clone().ok_or(ConfigError::Missing("--output"))?;
            Config::new(input, output)
        }
    };

    if let Some(input) = &cli.input {
        config = config.with_input_folder(input);
    }
    if let Some(output) = &cli.output {
        config = config.with_output_folder(output);
    }

    let current = config.coefficients();
    let coefficients = Coefficients {
        a: cli.intercept.unwrap_or(current.a),
        b: cli.slope.unwrap_or(current.b),
    };
    config = config.with_coefficients(coefficients)?;

    if let Some(suffix) = &cli.suffix {
        config = config.with_suffix(suffix.as_str())?;
    }

    Ok(config)
}

fn engine(kind: EngineKind) -> Box<dyn RasterEngine> {
    match kind {
        EngineKind::Native => Box::new(NativeEngine),
        #[cfg(feature = "gdal")]
        EngineKind::Gdal => Box::new(GdalEngine),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = build_config(&cli)?;
    info!(
        "Correcting {} into {} with {:?} engine",
        config.input_folder().display(),
        config.output_folder().display(),
        cli.engine
    );

    let mut project = match &cli.project {
        Some(path) => Some(
            Project::open_or_new(path, "NDVI ETM+")
                .with_context(|| format!("Failed to open project {}", path.display()))?,
        ),
        None => None,
    };

    let runner = BatchRunner::new(config, engine(cli.engine));
    let mut reporter = Reporter::stdout();

    let mut discard = Discard;
    let report = {
        let sink: &mut dyn LayerSink = match project.as_mut() {
            Some(project) => project,
            None => &mut discard,
        };
        runner.run(sink, &mut reporter)?
    };

    if let (Some(project), Some(path)) = (&project, &cli.project) {
        project
            .save(path)
            .with_context(|| format!("Failed to save project {}", path.display()))?;
        info!("Saved project with {} layer(s) to {}", project.layers().len(), path.display());
    }

    if let Some(path) = &cli.report {
        report
            .save(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Wrote run report to {}", path.display());
    }

    Ok(())
}
