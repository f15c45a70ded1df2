use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::process::ExitCode;
use std::sync::Arc;

mod args;

use args::{Args, Command};
use mesh_snap::app::{run_capture_session, run_preview_session, SessionOutcome};
use mesh_snap::camera::{CaptureFacility, FileImport};
use mesh_snap::config::AppConfig;
use mesh_snap::presenter::TerminalSurface;
use mesh_snap::{create_detector, CaptureCoordinator, ImageRef, ImageStore, MeshOverlay};

#[cfg(feature = "webcam")]
fn open_camera(index: u32) -> Result<Box<dyn CaptureFacility>> {
    Ok(Box::new(mesh_snap::camera::WebcamCapture::new(index)?))
}

#[cfg(not(feature = "webcam"))]
fn open_camera(_index: u32) -> Result<Box<dyn CaptureFacility>> {
    anyhow::bail!("built without the 'webcam' feature; use `capture --from <photo>`")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Command::ListCameras = args.command {
        #[cfg(feature = "webcam")]
        mesh_snap::camera::list_cameras()?;
        #[cfg(not(feature = "webcam"))]
        println!("{}", "Camera support requires the 'webcam' feature.".yellow());
        return Ok(ExitCode::SUCCESS);
    }

    // 0. Load Config
    let mut config = AppConfig::load_from(&args.config)?;
    if let Some(kind) = args.detector {
        config.detector.kind = kind;
    }

    // 1. Setup collaborators
    let store = ImageStore::new(&config.storage.cache_dir).with_context(|| {
        format!(
            "Failed to prepare cache directory {}",
            config.storage.cache_dir.display()
        )
    })?;
    let detector = create_detector(&config.detector)?;
    println!("{}", format!("Active Detector: {}", detector.name()).cyan());
    let renderer = Arc::new(MeshOverlay::from_config(&config.overlay));
    let (coordinator, mut events) =
        CaptureCoordinator::new(store, detector, renderer, config.messages.clone());

    // 2. Run the session
    let outcome = match args.command {
        Command::Capture {
            from,
            cam_index,
            output,
        } => {
            let mut camera: Box<dyn CaptureFacility> = match from {
                Some(path) => Box::new(
                    FileImport::new(path).with_companion(&config.detector.sidecar_suffix),
                ),
                None => open_camera(cam_index)?,
            };
            let mut surface =
                TerminalSurface::new(output.unwrap_or(config.storage.output_path.clone()));
            run_capture_session(&coordinator, &mut events, camera.as_mut(), &mut surface).await?
        }
        Command::Preview { photo, output } => {
            let mut surface =
                TerminalSurface::new(output.unwrap_or(config.storage.output_path.clone()));
            run_preview_session(&coordinator, ImageRef::from_path(photo), &mut surface).await?
        }
        Command::ListCameras => return Ok(ExitCode::SUCCESS),
    };

    Ok(match outcome {
        SessionOutcome::Rendered => ExitCode::SUCCESS,
        SessionOutcome::NoPreview(_) | SessionOutcome::Abandoned => ExitCode::FAILURE,
    })
}
