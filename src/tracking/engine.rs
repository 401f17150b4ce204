//! The seam between the frame feeder and the tracking back-end.
//!
//! The feeder never looks inside the engine: it hands over one prepared
//! (color, depth, dynamic mask) triple per frame, asks for the resulting
//! state, and at the end of the session asks the engine to stop and to
//! persist its trajectories.

use std::path::Path;

use anyhow::Result;
use opencv::core::Mat;

use super::TrackingState;

/// A blocking RGB-D tracker fed with dynamic-object masks.
///
/// At most one `submit_frame` call is outstanding at a time. Implementations
/// may run their own worker threads internally.
pub trait TrackingEngine {
    /// Track one frame.
    ///
    /// `dynamic_mask` is a single-channel 8-bit image with 1 on dynamic pixels
    /// and 0 elsewhere, at the same resolution as `depth`.
    fn submit_frame(
        &mut self,
        color: &Mat,
        depth: &Mat,
        dynamic_mask: &Mat,
        timestamp: f64,
    ) -> Result<()>;

    /// State after the most recent `submit_frame`.
    fn tracking_state(&self) -> TrackingState;

    /// Uniform scale the engine expects input images to be resized by.
    fn image_scale(&self) -> f32 {
        1.0
    }

    /// Stop all internal workers. Called once, before any export.
    fn shutdown(&mut self);

    /// Write the per-frame camera trajectory.
    fn save_trajectory(&self, path: &Path) -> Result<()>;

    /// Write the keyframe trajectory.
    fn save_keyframe_trajectory(&self, path: &Path) -> Result<()>;

    /// Print a short summary of the engine's map to stdout.
    fn print_map_statistics(&self);
}
