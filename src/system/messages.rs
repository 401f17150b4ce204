//! Inter-thread message types.

/// Message sent from the tracking side to the keyframe recorder when a frame
/// is promoted to keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct NewKeyFrameMsg {
    /// Index of the frame within the session (0-based, submission order).
    pub frame_index: usize,

    /// Frame timestamp in seconds.
    pub timestamp: f64,

    /// Fraction of pixels with usable static depth.
    pub depth_coverage: f64,
}
