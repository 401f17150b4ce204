//! Real-time playback pacing.
//!
//! Offline sequences are replayed at roughly the rate they were recorded:
//! after a frame is processed, the feeder sleeps for whatever is left of the
//! gap to the neighbouring timestamp. The policy is purely local. It never
//! looks past one neighbour, never catches up on accumulated drift and never
//! drops frames.

use std::thread;
use std::time::Duration;

use tracing::trace;

/// Time budget (seconds) for frame `index`: the gap to the next timestamp,
/// or to the previous one for the last frame. Zero for a single frame.
pub fn frame_budget(timestamps: &[f64], index: usize) -> f64 {
    if index + 1 < timestamps.len() {
        timestamps[index + 1] - timestamps[index]
    } else if index > 0 && index < timestamps.len() {
        timestamps[index] - timestamps[index - 1]
    } else {
        0.0
    }
}

/// How long to sleep after frame `index` took `elapsed` to process.
///
/// Gaps too large for a `Duration` saturate to `Duration::MAX`.
pub fn idle_interval(timestamps: &[f64], index: usize, elapsed: Duration) -> Duration {
    let slack = frame_budget(timestamps, index) - elapsed.as_secs_f64();
    if slack > 0.0 {
        Duration::try_from_secs_f64(slack).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Sleeps out the slack of each frame against the sequence timestamps.
pub struct FramePacer {
    timestamps: Vec<f64>,
    realtime: bool,
}

impl FramePacer {
    pub fn new(timestamps: Vec<f64>, realtime: bool) -> Self {
        Self {
            timestamps,
            realtime,
        }
    }

    /// Block until frame `index`'s budget is used up. Returns the interval
    /// slept (zero when pacing is off or the frame overran).
    pub fn pace(&self, index: usize, elapsed: Duration) -> Duration {
        let idle = idle_interval(&self.timestamps, index, elapsed);
        trace!(
            "frame {}: processed in {:.4}s, idle {:.4}s",
            index,
            elapsed.as_secs_f64(),
            idle.as_secs_f64()
        );
        if !self.realtime || idle.is_zero() {
            return Duration::ZERO;
        }
        thread::sleep(idle);
        idle
    }
}
