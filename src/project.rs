use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::engine::RasterLayer;
use crate::extent::Extent;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize project: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives every corrected raster once it is written.
pub trait LayerSink {
    fn register(&mut self, layer: &RasterLayer);
}

impl<F: FnMut(&RasterLayer)> LayerSink for F {
    fn register(&mut self, layer: &RasterLayer) {
        self(layer)
    }
}

/// Sink that ignores registrations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl LayerSink for Discard {
    fn register(&mut self, _layer: &RasterLayer) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub name: String,
    pub source: PathBuf,
    pub width: usize,
    pub height: usize,
    pub extent: Extent,
    pub added_at: DateTime<Utc>,
}

/// Workspace of registered raster layers, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    layers: Vec<MapLayer>,
}

impl Project {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            layers: Vec::new(),
        }
    }

    /// Opens an existing project file, or starts an empty one when the file
    /// doesn't exist yet.
    pub fn open_or_new<P: AsRef<Path>>(path: P, title: &str) -> Result<Self, ProjectError> {
        match File::open(path.as_ref()) {
            Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Project::new(title)),
            Err(e) => Err(e.into()),
        }
    }

    /// Adds `layer`, replacing a layer already registered from the same source.
    pub fn add_map_layer(&mut self, layer: &RasterLayer) {
        let map_layer = MapLayer {
            name: layer.name.clone(),
            source: layer.path.clone(),
            width: layer.width,
            height: layer.height,
            extent: layer.extent,
            added_at: Utc::now(),
        };

        match self.layers.iter_mut().find(|l| l.source == layer.path) {
            Some(existing) => *existing = map_layer,
            None => self.layers.push(map_layer),
        }

        info!("Added layer {} to project {}", layer.name, self.title);
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProjectError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl LayerSink for Project {
    fn register(&mut self, layer: &RasterLayer) {
        self.add_map_layer(layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn layer(path: &str) -> RasterLayer {
        RasterLayer {
            path: PathBuf::from(path),
            name: RasterLayer::layer_name(Path::new(path)),
            width: 10,
            height: 20,
            extent: Extent::pixel_space(10, 20),
            band_count: 1,
            no_data: None,
        }
    }

    #[test]
    fn test_add_map_layer_replaces_same_source() {
        let mut project = Project::new("NDVI");
        project.register(&layer("out/tile01_ETM.tif"));
        project.register(&layer("out/tile02_ETM.tif"));
        project.register(&layer("out/tile01_ETM.tif"));

        let names: Vec<_> = project.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["tile01_ETM.tif", "tile02_ETM.tif"]);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.json");

        let mut project = Project::open_or_new(&path, "NDVI").unwrap();
        assert!(project.layers().is_empty());

        project.add_map_layer(&layer("out/tile01_ETM.tif"));
        project.save(&path).unwrap();

        let reopened = Project::open_or_new(&path, "ignored").unwrap();
        assert_eq!(reopened, project);
        assert_eq!(reopened.title, "NDVI");
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |layer: &RasterLayer| seen.push(layer.name.clone());
            sink.register(&layer("a_ETM.tif"));
        }
        assert_eq!(seen, vec!["a_ETM.tif"]);
    }
}
