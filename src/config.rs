//! Settings file.
//!
//! Settings are the ORB-SLAM style YAML file shared with the tracking engine.
//! Keys are flat dotted names (`Camera.fx`, `Viewer.on`, ...); only the ones
//! read below matter here and everything else is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::masking::{DEFAULT_CANVAS, DEFAULT_DILATION_SIZE, DepthInvalidation, MaskConfig};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(rename = "Viewer.on", default = "default_viewer")]
    pub viewer_on: i32,

    #[serde(rename = "Camera.imageScale", default = "default_image_scale")]
    pub image_scale: f32,

    #[serde(rename = "Mask.dilationSize", default = "default_dilation_size")]
    pub dilation_size: i32,

    #[serde(rename = "Mask.canvasRows", default = "default_canvas_rows")]
    pub canvas_rows: i32,

    #[serde(rename = "Mask.canvasCols", default = "default_canvas_cols")]
    pub canvas_cols: i32,

    #[serde(rename = "Mask.invalidate", default)]
    pub invalidation: DepthInvalidation,

    #[serde(rename = "Pacing.realtime", default = "default_true")]
    pub realtime_pacing: bool,

    /// Minimum fraction of usable static depth for a frame to count as tracked.
    #[serde(rename = "Engine.minDepthCoverage", default = "default_min_depth_coverage")]
    pub min_depth_coverage: f64,

    #[serde(rename = "Engine.keyframeInterval", default = "default_keyframe_interval")]
    pub keyframe_interval: usize,
}

fn default_viewer() -> i32 {
    1
}

fn default_image_scale() -> f32 {
    1.0
}

fn default_dilation_size() -> i32 {
    DEFAULT_DILATION_SIZE
}

fn default_canvas_rows() -> i32 {
    DEFAULT_CANVAS.0
}

fn default_canvas_cols() -> i32 {
    DEFAULT_CANVAS.1
}

fn default_true() -> bool {
    true
}

fn default_min_depth_coverage() -> f64 {
    0.2
}

fn default_keyframe_interval() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            viewer_on: default_viewer(),
            image_scale: default_image_scale(),
            dilation_size: default_dilation_size(),
            canvas_rows: default_canvas_rows(),
            canvas_cols: default_canvas_cols(),
            invalidation: DepthInvalidation::default(),
            realtime_pacing: true,
            min_depth_coverage: default_min_depth_coverage(),
            keyframe_interval: default_keyframe_interval(),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Parse settings text. The `%YAML:1.0` directive written by OpenCV's
    /// FileStorage is not valid YAML 1.2 and is dropped first; `!!opencv-matrix`
    /// style tags are stripped so tagged entries read as plain mappings.
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        let body: String = text
            .lines()
            .filter(|line| !line.trim_start().starts_with("%YAML"))
            .collect::<Vec<_>>()
            .join("\n");
        if body.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut value: Value = serde_yaml::from_str(&body)?;
        if let Value::Mapping(entries) = &mut value {
            for (_, entry) in entries.iter_mut() {
                if let Value::Tagged(tagged) = entry {
                    let inner = std::mem::take(&mut tagged.value);
                    *entry = inner;
                }
            }
        }
        serde_yaml::from_value(value)
    }

    pub fn viewer_enabled(&self) -> bool {
        self.viewer_on != 0
    }

    pub fn mask_config(&self) -> MaskConfig {
        MaskConfig {
            dilation_size: self.dilation_size,
            canvas_rows: self.canvas_rows,
            canvas_cols: self.canvas_cols,
            invalidation: self.invalidation,
            ..MaskConfig::default()
        }
    }
}
