//! Keyframe recorder thread.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info};

use super::messages::NewKeyFrameMsg;
use super::shared_state::SharedState;

/// Timeout for receiving keyframes. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub struct KeyframeRecorder {
    received: usize,
}

impl KeyframeRecorder {
    pub fn new() -> Self {
        Self { received: 0 }
    }

    /// Block on `kf_receiver` until the sender is dropped, or until shutdown
    /// is requested and the queue is empty. Queued keyframes are never lost.
    pub fn run(&mut self, kf_receiver: Receiver<NewKeyFrameMsg>, shared: Arc<SharedState>) {
        loop {
            match kf_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => self.process_keyframe(msg, &shared),
                Err(RecvTimeoutError::Timeout) => {
                    if shared.is_shutdown_requested() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Keyframe recorder exiting after {} keyframes", self.received);
    }

    fn process_keyframe(&mut self, msg: NewKeyFrameMsg, shared: &SharedState) {
        self.received += 1;
        debug!(
            "Keyframe {} from frame {} (t={:.6}, coverage={:.3})",
            self.received, msg.frame_index, msg.timestamp, msg.depth_coverage
        );
        shared.keyframes.write().push(msg);
    }
}

impl Default for KeyframeRecorder {
    fn default() -> Self {
        Self::new()
    }
}
