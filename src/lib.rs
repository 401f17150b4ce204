pub mod config;
pub mod error;
pub mod io;
pub mod masking;
pub mod pacing;
pub mod pipeline;
pub mod stats;
pub mod system;
pub mod tracking;
