//! TUM RGB-D association files and per-frame image loading.
//!
//! An association file pairs color and depth images recorded at (nearly) the
//! same instant, one pair per line:
//!
//! ```text
//! 1305031102.175304 rgb/1305031102.175304.png 1305031102.160407 depth/1305031102.160407.png
//! ```
//!
//! The dynamic-object mask of each frame is not listed; it lives next to the
//! color image, under the same name with `rgb` replaced by `mask`
//! (`mask/1305031102.175304.png`).

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgcodecs, imgcodecs::IMREAD_UNCHANGED};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ImageKind, PipelineError, Result};

const COLOR_TOKEN: &str = "rgb";
const MASK_TOKEN: &str = "mask";

/// One line of the association file.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Color timestamp in seconds; drives pacing.
    pub timestamp: f64,
    pub color_path: String,
    pub depth_path: String,
    /// `None` when the color path has no `rgb` component to substitute.
    pub mask_path: Option<String>,
}

/// Why a manifest line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineFault {
    MissingFields { found: usize },
    BadTimestamp { field: String },
}

impl fmt::Display for LineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFault::MissingFields { found } => {
                write!(f, "expected 4 fields, found {}", found)
            }
            LineFault::BadTimestamp { field } => write!(f, "invalid timestamp '{}'", field),
        }
    }
}

/// A manifest line that did not produce a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {fault}")]
pub struct CatalogLineError {
    /// 1-based line number.
    pub line: usize,
    pub fault: LineFault,
}

/// Ordered frames of a sequence, as listed in its association file.
#[derive(Debug, Clone, Default)]
pub struct SequenceCatalog {
    pub records: Vec<FrameRecord>,
    pub rejected: Vec<CatalogLineError>,
}

impl SequenceCatalog {
    /// Load an association file.
    ///
    /// Blank lines and `#` comments are skipped. Lines that cannot be parsed
    /// are reported and left out; only failing to open or read the file is an
    /// error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |source| PipelineError::ManifestUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(unreadable)?;
        let reader = BufReader::new(file);

        let mut catalog = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(unreadable)?;
            match parse_line(&line) {
                Ok(Some(record)) => {
                    if record.mask_path.is_none() {
                        warn!(
                            "line {}: no '{}' in color path {}, frame has no mask",
                            idx + 1,
                            COLOR_TOKEN,
                            record.color_path
                        );
                    }
                    catalog.records.push(record);
                }
                Ok(None) => {}
                Err(fault) => {
                    let err = CatalogLineError {
                        line: idx + 1,
                        fault,
                    };
                    warn!("{}: {}", path.display(), err);
                    catalog.rejected.push(err);
                }
            }
        }

        debug!(
            "Loaded {} frames from {} ({} lines rejected)",
            catalog.records.len(),
            path.display(),
            catalog.rejected.len()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.timestamp).collect()
    }
}

/// Parse one manifest line. `Ok(None)` for blank and comment lines.
fn parse_line(line: &str) -> std::result::Result<Option<FrameRecord>, LineFault> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(LineFault::MissingFields { found: parts.len() });
    }

    let timestamp = parse_timestamp(parts[0])?;
    // The depth timestamp only has to be well formed; color time drives pacing.
    parse_timestamp(parts[2])?;

    let color_path = parts[1].to_string();
    Ok(Some(FrameRecord {
        timestamp,
        mask_path: mask_path_for(&color_path),
        depth_path: parts[3].to_string(),
        color_path,
    }))
}

fn parse_timestamp(field: &str) -> std::result::Result<f64, LineFault> {
    field
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| LineFault::BadTimestamp {
            field: field.to_string(),
        })
}

/// Mask path for a color path: the first `rgb` becomes `mask`.
pub fn mask_path_for(color_path: &str) -> Option<String> {
    color_path
        .find(COLOR_TOKEN)
        .map(|pos| {
            format!(
                "{}{}{}",
                &color_path[..pos],
                MASK_TOKEN,
                &color_path[pos + COLOR_TOKEN.len()..]
            )
        })
}

/// Decoded images of one frame, exactly as stored on disk.
#[derive(Debug)]
pub struct RawFrame {
    pub color: Mat,
    pub depth: Mat,
    pub mask: Mat,
}

impl RawFrame {
    /// Decode the three images of `record` below `root`.
    ///
    /// Any image that fails to decode is fatal. Whether depth and mask agree
    /// in size is left to the caller.
    pub fn load(root: &Path, record: &FrameRecord, mask_path: &str) -> Result<Self> {
        let color = read_image(root, &record.color_path, ImageKind::Color)?;
        let mask = read_image(root, mask_path, ImageKind::Mask)?;
        let depth = read_image(root, &record.depth_path, ImageKind::Depth)?;
        Ok(Self { color, depth, mask })
    }

    /// Depth and mask must cover the same pixels for masking to make sense.
    pub fn depth_matches_mask(&self) -> Result<bool> {
        Ok(self.depth.size()? == self.mask.size()?)
    }
}

fn read_image(root: &Path, relative: &str, kind: ImageKind) -> Result<Mat> {
    let path: PathBuf = root.join(relative);
    let load_error = || PipelineError::ImageLoad {
        kind,
        path: path.clone(),
    };
    let path_str = path.to_str().ok_or_else(load_error)?;
    // imread signals unreadable/undecodable files with an empty Mat.
    let image = imgcodecs::imread(path_str, IMREAD_UNCHANGED)?;
    if image.empty() {
        return Err(load_error());
    }
    Ok(image)
}
