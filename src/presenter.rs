use anyhow::{Context, Result};
use colored::*;
use image::{DynamicImage, RgbaImage};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::RenderState;

/// Shows the render state of a preview session.
pub trait PreviewSurface {
    fn show(&mut self, state: &RenderState) -> Result<()>;
    fn notice(&mut self, message: &str);
}

/// Terminal preview: spinner while pending, the composited photo written to disk on success.
pub struct TerminalSurface {
    output_path: PathBuf,
    pretty: bool,
    spinner: Option<ProgressBar>,
}

impl TerminalSurface {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            pretty: std::io::stderr().is_terminal(),
            spinner: None,
        }
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl PreviewSurface for TerminalSurface {
    fn show(&mut self, state: &RenderState) -> Result<()> {
        match state {
            RenderState::Pending => {
                if self.spinner.is_some() {
                    return Ok(());
                }
                if self.pretty {
                    let spinner = ProgressBar::new_spinner();
                    spinner.set_draw_target(ProgressDrawTarget::stderr());
                    spinner.enable_steady_tick(Duration::from_millis(120));
                    let style = ProgressStyle::with_template("{spinner} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner());
                    spinner.set_style(style);
                    spinner.set_message("detecting face mesh…");
                    self.spinner = Some(spinner);
                } else {
                    eprintln!("==> detecting face mesh");
                }
            }
            RenderState::Failed(reason) => {
                self.clear_spinner();
                println!("{}", reason.red());
            }
            RenderState::Succeeded(bitmap) => {
                self.clear_spinner();
                save_preview(bitmap, &self.output_path)
                    .with_context(|| format!("Failed to write {}", self.output_path.display()))?;
                println!(
                    "{}",
                    format!("Mesh preview saved to {}", self.output_path.display()).green()
                );
            }
        }
        Ok(())
    }

    fn notice(&mut self, message: &str) {
        self.clear_spinner();
        println!("{}", message.yellow());
    }
}

// JPEG has no alpha channel, so flatten before encoding.
fn save_preview(bitmap: &RgbaImage, path: &Path) -> image::ImageResult<()> {
    let is_jpeg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8().save(path)
    } else {
        bitmap.save(path)
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.clear_spinner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;

    #[test]
    fn success_writes_the_composited_photo() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("preview.png");
        let mut surface = TerminalSurface::new(&output);

        surface.show(&RenderState::Pending).unwrap();
        let bitmap = RgbaImage::from_pixel(3, 2, Rgba([0, 255, 255, 255]));
        surface
            .show(&RenderState::Succeeded(Arc::new(bitmap.clone())))
            .unwrap();

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written, bitmap);
    }

    #[test]
    fn jpeg_output_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("preview.jpg");
        let mut surface = TerminalSurface::new(&output);

        let bitmap = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 128]));
        surface.show(&RenderState::Succeeded(Arc::new(bitmap))).unwrap();
        assert_eq!(image::image_dimensions(&output).unwrap(), (8, 8));
    }

    #[test]
    fn failure_does_not_write_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("preview.png");
        let mut surface = TerminalSurface::new(&output);

        surface.show(&RenderState::Failed("no face".into())).unwrap();
        assert!(!output.exists());
    }
}
