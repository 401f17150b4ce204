//! Stand-in tracking engine and its worker thread.
//!
//! `DepthCoverageEngine` implements [`crate::tracking::TrackingEngine`] so the
//! feeder can run end to end without a SLAM back-end. It keeps the shape of a
//! real engine: tracking runs in the caller's thread, keyframes are handed to
//! a recorder thread over a bounded channel, and shared data sits behind
//! locks.

mod coverage_engine;
pub mod keyframe_recorder;
pub mod messages;
pub mod shared_state;

pub use coverage_engine::{CoverageConfig, DepthCoverageEngine};
pub use messages::NewKeyFrameMsg;
pub use shared_state::SharedState;
