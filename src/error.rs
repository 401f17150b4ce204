//! Error types for the frame feeder.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which image of a frame triple failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Color,
    Depth,
    Mask,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageKind::Color => "image",
            ImageKind::Depth => "depth map",
            ImageKind::Mask => "mask",
        })
    }
}

/// Fatal conditions. Every variant ends the run with exit code 1 and none of
/// them leave output files behind.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot open association file {path}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no images found in provided path")]
    EmptyCatalog,

    #[error("failed to load {kind} at: {path}")]
    ImageLoad { kind: ImageKind, path: PathBuf },

    #[error("tracking engine failed on frame {index} (t={timestamp}): {source}")]
    Engine {
        index: usize,
        timestamp: f64,
        #[source]
        source: anyhow::Error,
    },

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(#[source] anyhow::Error),
}
