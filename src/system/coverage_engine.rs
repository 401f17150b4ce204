//! Depth-coverage engine: a stand-in tracker for running the feeder without
//! a SLAM back-end.
//!
//! The engine does not estimate motion. It judges each frame by the fraction
//! of pixels that still carry usable depth after masking (depth above the
//! invalid sentinel on a static pixel), which is what a real RGB-D tracker
//! would have left to work with:
//!
//! - before the first frame with enough coverage: `NotInitialized`
//! - enough coverage: `Ok`
//! - too little coverage right after an `Ok` frame: `RecentlyLost`
//! - too little coverage otherwise: `Lost`
//!
//! Every tracked frame keeps the identity pose, so the exported trajectories
//! document which timestamps were tracked rather than where the camera went.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender, bounded};
use opencv::core::{self, Mat};
use opencv::prelude::*;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::masking::INVALID_DEPTH;
use crate::tracking::{TrackingEngine, TrackingState};

use super::keyframe_recorder::KeyframeRecorder;
use super::messages::NewKeyFrameMsg;
use super::shared_state::SharedState;

/// Capacity of the keyframe channel between tracking and the recorder.
/// When the channel is full, tracking blocks briefly.
const KEYFRAME_CHANNEL_CAPACITY: usize = 5;

/// Identity orientation as TUM `qx qy qz qw`.
const IDENTITY_POSE: [&str; 7] = ["0", "0", "0", "0", "0", "0", "1"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageConfig {
    pub min_depth_coverage: f64,
    /// Minimum number of frames between keyframes.
    pub keyframe_interval: usize,
    pub image_scale: f32,
}

impl From<&Settings> for CoverageConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            min_depth_coverage: settings.min_depth_coverage,
            keyframe_interval: settings.keyframe_interval.max(1),
            image_scale: settings.image_scale,
        }
    }
}

pub struct DepthCoverageEngine {
    config: CoverageConfig,
    shared: Arc<SharedState>,
    kf_sender: Option<Sender<NewKeyFrameMsg>>,
    recorder_handle: Option<JoinHandle<()>>,

    state: TrackingState,
    initialized: bool,
    frames_seen: usize,
    last_keyframe: Option<usize>,
    /// Timestamps of frames tracked `Ok`.
    trajectory: Vec<f64>,
    coverage_sum: f64,
    depth_buf: Mat,
}

impl DepthCoverageEngine {
    /// Create the engine and spawn its keyframe recorder.
    ///
    /// The vocabulary is not used for tracking but must exist, so that a run
    /// configured for a real back-end fails the same way on a bad path.
    pub fn new(vocabulary: &Path, config: CoverageConfig) -> Result<Self> {
        let meta = fs::metadata(vocabulary)
            .with_context(|| format!("Failed to open vocabulary {}", vocabulary.display()))?;
        if !meta.is_file() {
            bail!("Vocabulary {} is not a file", vocabulary.display());
        }
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: CoverageConfig) -> Self {
        let shared = SharedState::new();
        let (kf_sender, kf_receiver) = bounded::<NewKeyFrameMsg>(KEYFRAME_CHANNEL_CAPACITY);
        let recorder_handle = Self::spawn_recorder(shared.clone(), kf_receiver);

        Self {
            config,
            shared,
            kf_sender: Some(kf_sender),
            recorder_handle: Some(recorder_handle),
            state: TrackingState::NoImagesYet,
            initialized: false,
            frames_seen: 0,
            last_keyframe: None,
            trajectory: Vec::new(),
            coverage_sum: 0.0,
            depth_buf: Mat::default(),
        }
    }

    fn spawn_recorder(
        shared: Arc<SharedState>,
        kf_receiver: Receiver<NewKeyFrameMsg>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut recorder = KeyframeRecorder::new();
            recorder.run(kf_receiver, shared);
        })
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Fraction of pixels with depth above the sentinel and mask value 0.
    fn depth_coverage(&mut self, depth: &Mat, dynamic_mask: &Mat) -> Result<f64> {
        if depth.channels() != 1 {
            bail!("Expected single-channel depth, got {} channels", depth.channels());
        }
        if depth.size()? != dynamic_mask.size()? {
            bail!(
                "Depth {:?} and mask {:?} differ in size",
                depth.size()?,
                dynamic_mask.size()?
            );
        }

        depth.convert_to(&mut self.depth_buf, core::CV_32F, 1.0, 0.0)?;
        let depth_px = self.depth_buf.data_typed::<f32>()?;
        let mask_px = dynamic_mask.data_typed::<u8>()?;
        if depth_px.is_empty() {
            return Ok(0.0);
        }

        let usable = depth_px
            .iter()
            .zip(mask_px)
            .filter(|&(&d, &m)| m == 0 && f64::from(d) > INVALID_DEPTH)
            .count();
        Ok(usable as f64 / depth_px.len() as f64)
    }

    fn next_state(&self, covered: bool) -> TrackingState {
        match (self.initialized, covered) {
            (_, true) => TrackingState::Ok,
            (false, false) => TrackingState::NotInitialized,
            (true, false) if self.state == TrackingState::Ok => TrackingState::RecentlyLost,
            (true, false) => TrackingState::Lost,
        }
    }

    fn maybe_insert_keyframe(&mut self, frame_index: usize, timestamp: f64, coverage: f64) {
        let due = self
            .last_keyframe
            .is_none_or(|last| frame_index - last >= self.config.keyframe_interval);
        if !due {
            return;
        }
        let Some(sender) = &self.kf_sender else {
            return;
        };
        let msg = NewKeyFrameMsg {
            frame_index,
            timestamp,
            depth_coverage: coverage,
        };
        if sender.send(msg).is_err() {
            warn!("Keyframe recorder is gone, dropping keyframe {}", frame_index);
            return;
        }
        self.last_keyframe = Some(frame_index);
    }

    fn write_tum<'a>(path: &Path, timestamps: impl Iterator<Item = &'a f64>) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_writer(file);
        for t in timestamps {
            let stamp = format!("{:.6}", t);
            let mut record = vec![stamp.as_str()];
            record.extend_from_slice(&IDENTITY_POSE);
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl TrackingEngine for DepthCoverageEngine {
    fn submit_frame(
        &mut self,
        _color: &Mat,
        depth: &Mat,
        dynamic_mask: &Mat,
        timestamp: f64,
    ) -> Result<()> {
        let frame_index = self.frames_seen;
        self.frames_seen += 1;

        let coverage = self.depth_coverage(depth, dynamic_mask)?;
        self.coverage_sum += coverage;
        let covered = coverage >= self.config.min_depth_coverage;

        self.state = self.next_state(covered);
        if covered {
            self.initialized = true;
            self.trajectory.push(timestamp);
            self.maybe_insert_keyframe(frame_index, timestamp, coverage);
        }

        debug!(
            "Frame {} (t={:.6}): coverage {:.3} -> {}",
            frame_index, timestamp, coverage, self.state
        );
        Ok(())
    }

    fn tracking_state(&self) -> TrackingState {
        self.state
    }

    fn image_scale(&self) -> f32 {
        self.config.image_scale
    }

    /// Drop the keyframe sender so the recorder drains its queue and exits,
    /// then wait for it.
    fn shutdown(&mut self) {
        self.kf_sender.take();
        self.shared.request_shutdown();
        if let Some(handle) = self.recorder_handle.take() {
            join_recorder(handle);
        }
    }

    fn save_trajectory(&self, path: &Path) -> Result<()> {
        println!("Saving camera trajectory to {} ...", path.display());
        Self::write_tum(path, self.trajectory.iter())
    }

    fn save_keyframe_trajectory(&self, path: &Path) -> Result<()> {
        println!("Saving keyframe trajectory to {} ...", path.display());
        let keyframes = self.shared.keyframes.read();
        Self::write_tum(path, keyframes.iter().map(|kf| &kf.timestamp))
    }

    fn print_map_statistics(&self) {
        let mean_coverage = if self.frames_seen == 0 {
            0.0
        } else {
            self.coverage_sum / self.frames_seen as f64
        };
        println!("Map statistics:");
        println!("  frames tracked: {}/{}", self.trajectory.len(), self.frames_seen);
        println!("  keyframes: {}", self.shared.num_keyframes());
        println!("  mean depth coverage: {:.3}", mean_coverage);
    }
}

/// Wait for the recorder thread. Returns false if it panicked.
fn join_recorder(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!("Keyframe recorder panicked, keyframes may be missing: {}", reason);
            false
        }
    }
}

impl Drop for DepthCoverageEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Scalar;

    const ROWS: i32 = 10;
    const COLS: i32 = 10;

    fn engine(keyframe_interval: usize) -> DepthCoverageEngine {
        DepthCoverageEngine::with_config(CoverageConfig {
            min_depth_coverage: 0.5,
            keyframe_interval,
            image_scale: 1.0,
        })
    }

    fn image(typ: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(ROWS, COLS, typ, Scalar::all(value)).unwrap()
    }

    fn submit(engine: &mut DepthCoverageEngine, depth_value: f64, t: f64) -> TrackingState {
        let color = image(core::CV_8UC3, 0.0);
        let depth = image(core::CV_16UC1, depth_value);
        let mask = image(core::CV_8UC1, 0.0);
        engine.submit_frame(&color, &depth, &mask, t).unwrap();
        engine.tracking_state()
    }

    #[test]
    fn test_state_transitions() {
        let mut e = engine(1);
        assert_eq!(e.tracking_state(), TrackingState::NoImagesYet);

        assert_eq!(submit(&mut e, 1.0, 0.0), TrackingState::NotInitialized);
        assert_eq!(submit(&mut e, 0.0, 0.1), TrackingState::NotInitialized);
        assert_eq!(submit(&mut e, 4000.0, 0.2), TrackingState::Ok);
        assert_eq!(submit(&mut e, 1.0, 0.3), TrackingState::RecentlyLost);
        assert_eq!(submit(&mut e, 1.0, 0.4), TrackingState::Lost);
        assert_eq!(submit(&mut e, 4000.0, 0.5), TrackingState::Ok);
    }

    #[test]
    fn test_dynamic_pixels_do_not_count() {
        let mut e = engine(1);
        let color = image(core::CV_8UC3, 0.0);
        let depth = image(core::CV_16UC1, 4000.0);
        let mask = image(core::CV_8UC1, 1.0);

        e.submit_frame(&color, &depth, &mask, 0.0).unwrap();
        assert_eq!(e.tracking_state(), TrackingState::NotInitialized);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let mut e = engine(1);
        let color = image(core::CV_8UC3, 0.0);
        let depth = image(core::CV_16UC1, 4000.0);
        let mask = Mat::new_rows_cols_with_default(5, 5, core::CV_8UC1, Scalar::all(0.0)).unwrap();

        assert!(e.submit_frame(&color, &depth, &mask, 0.0).is_err());
    }

    #[test]
    fn test_keyframes_respect_interval_and_survive_shutdown() {
        let mut e = engine(2);
        for i in 0..5 {
            submit(&mut e, 4000.0, i as f64 * 0.1);
        }
        e.shutdown();

        let keyframes = e.shared_state().keyframes.read();
        let indices: Vec<usize> = keyframes.iter().map(|kf| kf.frame_index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
    }

    #[test]
    fn test_recorder_panic_is_reported() {
        let handle = thread::spawn(|| panic!("recorder failed"));
        assert!(!join_recorder(handle));
        assert!(join_recorder(thread::spawn(|| ())));
    }

    #[test]
    fn test_trajectory_files_are_tum_formatted() {
        let mut e = engine(10);
        submit(&mut e, 4000.0, 1.5);
        submit(&mut e, 1.0, 1.6);
        submit(&mut e, 4000.0, 1.7);
        e.shutdown();

        let dir = tempfile::tempdir().unwrap();
        let traj = dir.path().join("CameraTrajectory.txt");
        let kf_traj = dir.path().join("KeyFrameTrajectory.txt");
        e.save_trajectory(&traj).unwrap();
        e.save_keyframe_trajectory(&kf_traj).unwrap();

        assert_eq!(
            fs::read_to_string(&traj).unwrap(),
            "1.500000 0 0 0 0 0 0 1\n1.700000 0 0 0 0 0 0 1\n"
        );
        assert_eq!(
            fs::read_to_string(&kf_traj).unwrap(),
            "1.500000 0 0 0 0 0 0 1\n"
        );
    }
}
