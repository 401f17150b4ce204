//! State shared between the tracking side and the keyframe recorder thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::messages::NewKeyFrameMsg;

/// Shared state accessible by both the caller thread and the recorder.
pub struct SharedState {
    /// Keyframes accepted by the recorder, in arrival order.
    /// Protected by RwLock: the recorder writes, exports and stats read.
    pub keyframes: RwLock<Vec<NewKeyFrameMsg>>,

    /// Request the recorder to exit once its queue is empty.
    pub shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.read().len()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            keyframes: RwLock::new(Vec::new()),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}
