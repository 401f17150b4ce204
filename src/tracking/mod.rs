//! Tracking seam: outcome classification and the engine trait the pipeline
//! drives.

pub mod engine;
pub mod state;

pub use engine::TrackingEngine;
pub use state::TrackingState;
