//! Dataset readers.

pub mod tum;

pub use tum::{FrameRecord, RawFrame, SequenceCatalog};
