//! Pipeline driver: feeds a sequence to a tracking engine frame by frame.
//!
//! Per frame, strictly in catalog order:
//!
//! 1. decode color, depth and mask (any decode failure aborts the run)
//! 2. skip the frame if it has no mask or depth and mask differ in size
//! 3. rescale color and depth by the engine's image scale
//! 4. time: mask transform + `submit_frame` + `tracking_state`
//! 5. record timing and outcome, then sleep out the frame's time budget
//!
//! After the last frame the engine is shut down, statistics are printed and
//! the trajectories and performance log are written.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Instant;

use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::io::{RawFrame, SequenceCatalog};
use crate::masking::{MaskConfig, MaskTransformer};
use crate::pacing::FramePacer;
use crate::stats::{SessionStats, SessionSummary};
use crate::tracking::TrackingEngine;

pub const TRAJECTORY_FILE: &str = "CameraTrajectory.txt";
pub const KEYFRAME_TRAJECTORY_FILE: &str = "KeyFrameTrajectory.txt";
pub const PERFORMANCE_FILE: &str = "Performances.txt";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory the manifest paths are relative to.
    pub sequence_root: PathBuf,
    /// Where trajectories and the performance log are written.
    pub output_dir: PathBuf,
    /// Block on Enter before shutting the engine down (viewer mode).
    pub wait_for_key: bool,
    pub mask: MaskConfig,
    pub realtime_pacing: bool,
}

impl PipelineOptions {
    pub fn new<P: Into<PathBuf>>(sequence_root: P) -> Self {
        Self {
            sequence_root: sequence_root.into(),
            output_dir: PathBuf::from("."),
            wait_for_key: false,
            mask: MaskConfig::default(),
            realtime_pacing: true,
        }
    }
}

/// Run a whole session and write its outputs.
pub fn run<E: TrackingEngine>(
    catalog: &SequenceCatalog,
    engine: &mut E,
    options: &PipelineOptions,
) -> Result<SessionSummary> {
    if catalog.is_empty() {
        return Err(PipelineError::EmptyCatalog);
    }

    println!();
    println!("-------");
    println!("Start processing sequence ...");
    println!("Images in the sequence: {}", catalog.len());
    println!();

    let stats = track_sequence(catalog, engine, options)?;

    if options.wait_for_key {
        println!("\n******************\n");
        println!("press a key to end");
        println!("\n******************\n");
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
    }

    engine.shutdown();

    let summary = stats.finalize();
    println!("-------");
    println!();
    println!("{}", summary);
    println!("-------");
    println!();

    engine.print_map_statistics();
    export(engine, &summary, &options.output_dir)?;

    println!("done!");
    Ok(summary)
}

/// The per-frame loop. Returns the unfinalized statistics.
pub fn track_sequence<E: TrackingEngine>(
    catalog: &SequenceCatalog,
    engine: &mut E,
    options: &PipelineOptions,
) -> Result<SessionStats> {
    let mut transformer = MaskTransformer::new(options.mask)?;
    let pacer = FramePacer::new(catalog.timestamps(), options.realtime_pacing);
    let mut stats = SessionStats::new(catalog.len());
    let image_scale = engine.image_scale();

    for (index, record) in catalog.records.iter().enumerate() {
        let Some(mask_path) = record.mask_path.as_deref() else {
            warn!(
                "Frame {}: no mask path for {}, skipping",
                index, record.color_path
            );
            continue;
        };

        let mut frame = RawFrame::load(&options.sequence_root, record, mask_path)?;
        if !frame.depth_matches_mask()? {
            warn!(
                "Depth map and mask size mismatch: {} ({:?} vs {:?}), skipping frame {}",
                record.depth_path,
                frame.depth.size()?,
                frame.mask.size()?,
                index
            );
            continue;
        }

        if image_scale != 1.0 {
            rescale(&mut frame.color, image_scale)?;
            rescale(&mut frame.depth, image_scale)?;
        }

        let t_start = Instant::now();
        let dynamic_mask = transformer.apply(&frame.mask, &mut frame.depth)?;
        engine
            .submit_frame(&frame.color, &frame.depth, dynamic_mask, record.timestamp)
            .map_err(|source| PipelineError::Engine {
                index,
                timestamp: record.timestamp,
                source,
            })?;
        let state = engine.tracking_state();
        let elapsed = t_start.elapsed();

        stats.record(elapsed, state);
        debug!(
            "Frame {}/{} (t={:.6}): {} in {:.4}s",
            index + 1,
            catalog.len(),
            record.timestamp,
            state,
            elapsed.as_secs_f64()
        );

        pacer.pace(index, elapsed);
    }

    info!(
        "Tracked {} of {} frames",
        stats.processed(),
        catalog.len()
    );
    Ok(stats)
}

/// Resize by a uniform factor, truncating the target size like the dataset
/// runners do.
fn rescale(image: &mut Mat, scale: f32) -> Result<()> {
    let width = (image.cols() as f32 * scale) as i32;
    let height = (image.rows() as f32 * scale) as i32;
    let mut resized = Mat::default();
    imgproc::resize(
        &*image,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    *image = resized;
    Ok(())
}

fn export<E: TrackingEngine>(engine: &E, summary: &SessionSummary, dir: &Path) -> Result<()> {
    engine
        .save_trajectory(&dir.join(TRAJECTORY_FILE))
        .map_err(PipelineError::Export)?;
    engine
        .save_keyframe_trajectory(&dir.join(KEYFRAME_TRAJECTORY_FILE))
        .map_err(PipelineError::Export)?;
    summary.write_performance_log(&dir.join(PERFORMANCE_FILE))?;
    Ok(())
}
