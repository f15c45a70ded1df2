use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::ImageRef;

/// The facility that fills a capture target with a photo.
pub trait CaptureFacility {
    /// Writes a photo into `target`. `Ok(false)` means the user cancelled.
    fn capture(&mut self, target: &ImageRef) -> Result<bool>;
}

/// Stands in for a camera by copying an existing photo into the target.
#[derive(Debug, Clone)]
pub struct FileImport {
    source: PathBuf,
    companion_suffix: Option<String>,
}

impl FileImport {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            companion_suffix: None,
        }
    }

    /// Also carries `<source><suffix>` over to `<target><suffix>` when present,
    /// so a precomputed mesh follows the photo into the cache.
    pub fn with_companion(mut self, suffix: &str) -> Self {
        self.companion_suffix = Some(suffix.to_string());
        self
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl CaptureFacility for FileImport {
    fn capture(&mut self, target: &ImageRef) -> Result<bool> {
        if !self.source.is_file() {
            bail!("photo to import not found: {}", self.source.display());
        }
        fs::copy(&self.source, target.path()).with_context(|| {
            format!("Failed to copy {} into {}", self.source.display(), target)
        })?;
        log::info!("Imported {} as {}", self.source.display(), target);

        if let Some(suffix) = &self.companion_suffix {
            let companion = with_suffix(&self.source, suffix);
            if companion.is_file() {
                let dest = with_suffix(target.path(), suffix);
                fs::copy(&companion, &dest).with_context(|| {
                    format!("Failed to copy {} into {}", companion.display(), dest.display())
                })?;
            }
        }
        Ok(true)
    }
}

#[cfg(feature = "webcam")]
pub use webcam::{list_cameras, WebcamCapture};

#[cfg(feature = "webcam")]
mod webcam {
    use anyhow::{anyhow, Context, Result};
    use colored::*;
    use image::ImageFormat;
    use nokhwa::{
        pixel_format::RgbFormat,
        utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
        Camera,
    };

    use super::CaptureFacility;
    use crate::types::ImageRef;

    /// Grabs a single frame from a local camera.
    pub struct WebcamCapture {
        camera: Camera,
    }

    impl WebcamCapture {
        pub fn new(index: u32) -> Result<Self> {
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
            let mut camera = Camera::new(CameraIndex::Index(index), requested)
                .context("Failed to create camera instance")?;

            camera
                .open_stream()
                .map_err(|e| anyhow!(e))
                .context("Failed to open camera stream")?;

            println!(
                "{}",
                format!("Opened camera: {}", camera.info().human_name()).green()
            );
            log::info!("Format: {}", camera.camera_format());

            Ok(Self { camera })
        }
    }

    impl CaptureFacility for WebcamCapture {
        fn capture(&mut self, target: &ImageRef) -> Result<bool> {
            let frame = self
                .camera
                .frame()
                .map_err(|e| anyhow!(e))
                .context("Failed to get frame")?;
            let decoded = frame
                .decode_image::<RgbFormat>()
                .map_err(|e| anyhow!(e))
                .context("Failed to decode frame")?;
            decoded
                .save_with_format(target.path(), ImageFormat::Jpeg)
                .with_context(|| format!("Failed to write {}", target))?;
            Ok(true)
        }
    }

    impl Drop for WebcamCapture {
        fn drop(&mut self) {
            let _ = self.camera.stop_stream();
        }
    }

    pub fn list_cameras() -> Result<()> {
        let cameras = nokhwa::query(ApiBackend::Auto)?;
        println!("Available Cameras:");
        println!("{:<5} | {:<30} | {:<10}", "Index", "Name", "Misc");
        println!("{}", "-".repeat(60));
        for cam in cameras {
            println!("{:<5} | {:<30} | {:?}", cam.index(), cam.human_name(), cam.misc());
        }
        Ok(())
    }
}
