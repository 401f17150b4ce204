//! Per-session tracking statistics.
//!
//! One timing sample and one outcome are recorded for every frame that
//! reached the tracker. Percentages are taken over the nominal number of
//! frames in the sequence, so frames skipped before tracking still count in
//! the denominator.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::tracking::TrackingState;

/// Running statistics, mutated once per tracked frame.
#[derive(Debug, Clone)]
pub struct SessionStats {
    samples: Vec<f64>,
    not_initialized: usize,
    lost: usize,
    total_frames: usize,
}

impl SessionStats {
    /// `total_frames` is the catalog size, not the number of frames that will
    /// eventually be tracked.
    pub fn new(total_frames: usize) -> Self {
        Self {
            samples: Vec::with_capacity(total_frames),
            not_initialized: 0,
            lost: 0,
            total_frames,
        }
    }

    pub fn record(&mut self, elapsed: Duration, state: TrackingState) {
        self.samples.push(elapsed.as_secs_f64());
        if state.is_not_initialized() {
            self.not_initialized += 1;
        }
        if state.is_lost() {
            self.lost += 1;
        }
    }

    /// Number of frames recorded so far.
    pub fn processed(&self) -> usize {
        self.samples.len()
    }

    pub fn finalize(mut self) -> SessionSummary {
        self.samples.sort_by(f64::total_cmp);

        let n = self.samples.len();
        let (median, mean) = if n == 0 {
            (None, None)
        } else {
            let total: f64 = self.samples.iter().sum();
            (Some(self.samples[n / 2]), Some(total / n as f64))
        };

        SessionSummary {
            median,
            mean,
            percent_lost: percent(self.lost, self.total_frames),
            percent_not_initialized: percent(self.not_initialized, self.total_frames),
            total_frames: self.total_frames,
            processed_frames: n,
        }
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Finalized session statistics. Timing values are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// `None` when no frame reached the tracker.
    pub median: Option<f64>,
    pub mean: Option<f64>,
    pub percent_lost: f64,
    pub percent_not_initialized: f64,
    pub total_frames: usize,
    pub processed_frames: usize,
}

impl SessionSummary {
    /// Write the performance log: lost %, no-init %, median, mean, one per
    /// line in that order.
    pub fn write_performance_log(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "perc images lost: {}", self.percent_lost)?;
        writeln!(out, "perc images no init: {}", self.percent_not_initialized)?;
        writeln!(out, "median tracking time: {}", Seconds(self.median))?;
        writeln!(out, "mean tracking time: {}", Seconds(self.mean))?;
        out.flush()
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "median tracking time: {}", Seconds(self.median))?;
        writeln!(f, "mean tracking time: {}", Seconds(self.mean))?;
        writeln!(f, "perc images lost: {}", self.percent_lost)?;
        write!(f, "perc images no init: {}", self.percent_not_initialized)
    }
}

struct Seconds(Option<f64>);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(secs) => write!(f, "{}", secs),
            None => f.write_str("n/a"),
        }
    }
}
