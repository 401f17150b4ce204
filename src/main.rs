use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

use rgbd_dyna::config::Settings;
use rgbd_dyna::error::PipelineError;
use rgbd_dyna::io::SequenceCatalog;
use rgbd_dyna::pipeline::{self, PipelineOptions};
use rgbd_dyna::system::{CoverageConfig, DepthCoverageEngine};

const USAGE: &str =
    "Usage: rgbd_dyna path_to_vocabulary path_to_settings path_to_sequence path_to_association";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 5 {
        eprintln!();
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    }

    match run(&args[1], &args[2], &args[3], &args[4]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(vocabulary: &str, settings_path: &str, sequence: &str, association: &str) -> Result<()> {
    let catalog = SequenceCatalog::load(association)?;
    if catalog.is_empty() {
        return Err(PipelineError::EmptyCatalog.into());
    }

    let settings = Settings::load(settings_path)?;
    let mut engine = DepthCoverageEngine::new(Path::new(vocabulary), CoverageConfig::from(&settings))
        .context("Failed to create tracking engine")?;

    let options = PipelineOptions {
        wait_for_key: settings.viewer_enabled(),
        mask: settings.mask_config(),
        realtime_pacing: settings.realtime_pacing,
        ..PipelineOptions::new(sequence)
    };

    pipeline::run(&catalog, &mut engine, &options)?;
    Ok(())
}
