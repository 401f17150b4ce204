use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use opencv::core::{self, Mat, Scalar, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use tempfile::{TempDir, tempdir};

use rgbd_dyna::error::{ImageKind, PipelineError};
use rgbd_dyna::io::SequenceCatalog;
use rgbd_dyna::masking::MaskConfig;
use rgbd_dyna::pipeline::{self, PipelineOptions};
use rgbd_dyna::tracking::{TrackingEngine, TrackingState};

const ROWS: i32 = 24;
const COLS: i32 = 32;

/// Engine double that records what it was fed.
#[derive(Default)]
struct RecordingEngine {
    submitted: Vec<(f64, core::Size)>,
    states: Vec<TrackingState>,
    shut_down: bool,
}

impl TrackingEngine for RecordingEngine {
    fn submit_frame(&mut self, _color: &Mat, depth: &Mat, mask: &Mat, timestamp: f64) -> Result<()> {
        assert_eq!(depth.size()?, mask.size()?);
        self.submitted.push((timestamp, depth.size()?));
        Ok(())
    }

    fn tracking_state(&self) -> TrackingState {
        self.states
            .get(self.submitted.len().saturating_sub(1))
            .copied()
            .unwrap_or(TrackingState::Ok)
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }

    fn save_trajectory(&self, path: &Path) -> Result<()> {
        fs::write(path, "trajectory\n")?;
        Ok(())
    }

    fn save_keyframe_trajectory(&self, path: &Path) -> Result<()> {
        fs::write(path, "keyframes\n")?;
        Ok(())
    }

    fn print_map_statistics(&self) {}
}

fn write_image(path: &Path, rows: i32, cols: i32, typ: i32, value: f64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let image = Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(value)).unwrap();
    assert!(imgcodecs::imwrite(path.to_str().unwrap(), &image, &Vector::new()).unwrap());
}

/// Write a sequence of `n` frames, 10 ms apart. Frames listed in
/// `bad_depth` get a depth image of the wrong size.
fn write_sequence(n: usize, bad_depth: &[usize]) -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let mut manifest = String::new();

    for i in 0..n {
        let t = i as f64 * 0.01;
        let (depth_rows, depth_cols) = if bad_depth.contains(&i) {
            (ROWS / 2, COLS / 2)
        } else {
            (ROWS, COLS)
        };
        write_image(&root.join(format!("rgb/{i}.png")), ROWS, COLS, core::CV_8UC3, 128.0);
        write_image(
            &root.join(format!("depth/{i}.png")),
            depth_rows,
            depth_cols,
            core::CV_16UC1,
            5000.0,
        );
        write_image(&root.join(format!("mask/{i}.png")), ROWS, COLS, core::CV_8UC1, 0.0);
        manifest.push_str(&format!("{t:.6} rgb/{i}.png {t:.6} depth/{i}.png\n"));
    }

    fs::write(root.join("associations.txt"), manifest).unwrap();
    dir
}

fn options(root: &Path) -> PipelineOptions {
    PipelineOptions {
        output_dir: root.to_path_buf(),
        mask: MaskConfig {
            dilation_size: 2,
            canvas_rows: ROWS,
            canvas_cols: COLS,
            ..MaskConfig::default()
        },
        ..PipelineOptions::new(root)
    }
}

#[test]
fn mismatched_frame_is_skipped_but_counted() {
    let dir = write_sequence(3, &[1]);
    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = RecordingEngine {
        states: vec![TrackingState::Lost, TrackingState::Ok],
        ..RecordingEngine::default()
    };

    let summary = pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap();

    let timestamps: Vec<f64> = engine.submitted.iter().map(|(t, _)| *t).collect();
    assert_eq!(timestamps, vec![0.0, 0.02]);
    assert!(engine.shut_down);

    assert_eq!(summary.processed_frames, 2);
    assert_eq!(summary.total_frames, 3);
    assert!((summary.percent_lost - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.percent_not_initialized, 0.0);

    for file in [
        pipeline::TRAJECTORY_FILE,
        pipeline::KEYFRAME_TRAJECTORY_FILE,
        pipeline::PERFORMANCE_FILE,
    ] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }
    let perf = fs::read_to_string(dir.path().join(pipeline::PERFORMANCE_FILE)).unwrap();
    assert!(perf.starts_with("perc images lost: 33.3"));
    assert_eq!(perf.lines().count(), 4);
}

#[test]
fn frame_without_mask_path_is_skipped() {
    let dir = write_sequence(2, &[]);
    let manifest = fs::read_to_string(dir.path().join("associations.txt")).unwrap();
    fs::create_dir_all(dir.path().join("color")).unwrap();
    fs::copy(dir.path().join("rgb/1.png"), dir.path().join("color/1.png")).unwrap();
    fs::write(
        dir.path().join("associations.txt"),
        manifest.replace("rgb/1.png", "color/1.png"),
    )
    .unwrap();

    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = RecordingEngine::default();
    let summary = pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap();

    assert_eq!(engine.submitted.len(), 1);
    assert_eq!(summary.total_frames, 2);
}

#[test]
fn image_scale_resizes_color_and_depth() {
    struct HalfScale(RecordingEngine);

    impl TrackingEngine for HalfScale {
        fn submit_frame(&mut self, color: &Mat, depth: &Mat, mask: &Mat, t: f64) -> Result<()> {
            assert_eq!(color.size()?, depth.size()?);
            self.0.submit_frame(color, depth, mask, t)
        }
        fn tracking_state(&self) -> TrackingState {
            self.0.tracking_state()
        }
        fn image_scale(&self) -> f32 {
            0.5
        }
        fn shutdown(&mut self) {}
        fn save_trajectory(&self, path: &Path) -> Result<()> {
            self.0.save_trajectory(path)
        }
        fn save_keyframe_trajectory(&self, path: &Path) -> Result<()> {
            self.0.save_keyframe_trajectory(path)
        }
        fn print_map_statistics(&self) {}
    }

    let dir = write_sequence(1, &[]);
    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = HalfScale(RecordingEngine::default());
    pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap();

    assert_eq!(engine.0.submitted, vec![(0.0, core::Size::new(COLS / 2, ROWS / 2))]);
}

#[test]
fn missing_mask_image_aborts_before_export() {
    let dir = write_sequence(2, &[]);
    fs::remove_file(dir.path().join("mask/1.png")).unwrap();

    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = RecordingEngine::default();
    let err = pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ImageLoad {
            kind: ImageKind::Mask,
            ..
        }
    ));
    assert!(!dir.path().join(pipeline::PERFORMANCE_FILE).exists());
    assert!(!engine.shut_down);
}

#[test]
fn missing_depth_image_aborts_before_export() {
    let dir = write_sequence(2, &[]);
    fs::remove_file(dir.path().join("depth/1.png")).unwrap();

    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = RecordingEngine::default();
    let err = pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap_err();

    match err {
        PipelineError::ImageLoad { kind, path } => {
            assert_eq!(kind, ImageKind::Depth);
            assert!(path.ends_with("depth/1.png"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.submitted.len(), 1);
    assert!(!dir.path().join(pipeline::TRAJECTORY_FILE).exists());
    assert!(!engine.shut_down);
}

#[test]
fn empty_catalog_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("associations.txt"), "\n\n").unwrap();
    let catalog = SequenceCatalog::load(dir.path().join("associations.txt")).unwrap();
    let mut engine = RecordingEngine::default();

    let err = pipeline::run(&catalog, &mut engine, &options(dir.path())).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyCatalog));
}

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rgbd_dyna"))
}

#[test]
fn binary_rejects_wrong_argument_count() {
    let status = binary().arg("only-one").status().unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn binary_runs_sequence_end_to_end() {
    let dir = write_sequence(3, &[1]);
    let root = dir.path();
    fs::write(root.join("ORBvoc.txt"), "10 6 0 0\n").unwrap();
    fs::write(
        root.join("settings.yaml"),
        "%YAML:1.0\nViewer.on: 0\nPacing.realtime: false\nMask.dilationSize: 2\nMask.invalidate: dynamic\n",
    )
    .unwrap();

    let status = binary()
        .current_dir(root)
        .args([
            "ORBvoc.txt",
            "settings.yaml",
            root.to_str().unwrap(),
            "associations.txt",
        ])
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    let trajectory = fs::read_to_string(root.join(pipeline::TRAJECTORY_FILE)).unwrap();
    assert_eq!(trajectory.lines().count(), 2);
    assert!(root.join(pipeline::KEYFRAME_TRAJECTORY_FILE).exists());
    assert!(root.join(pipeline::PERFORMANCE_FILE).exists());
}

#[test]
fn binary_fails_on_missing_manifest() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("ORBvoc.txt"), "10 6 0 0\n").unwrap();
    fs::write(dir.path().join("settings.yaml"), "Viewer.on: 0\n").unwrap();

    let status = binary()
        .current_dir(dir.path())
        .args(["ORBvoc.txt", "settings.yaml", ".", "associations.txt"])
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(!dir.path().join(pipeline::PERFORMANCE_FILE).exists());
}
