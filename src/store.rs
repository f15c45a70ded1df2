use chrono::Local;
use image::{ImageReader, RgbaImage};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, PreviewError};
use crate::types::ImageRef;

/// Allocates capture targets inside a private cache directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    cache_dir: PathBuf,
}

impl ImageStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Creates an empty `JPEG_<yyyyMMdd_HHmmss>_.jpg` file for the camera to write into.
    ///
    /// Names taken earlier in the same second get a numeric suffix, so every call
    /// returns a distinct file.
    pub fn create_capture_target(&self) -> Result<ImageRef, CaptureError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("JPEG_{stamp}_.jpg")
            } else {
                format!("JPEG_{stamp}_{attempt}.jpg")
            };
            let path = self.cache_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    log::debug!("allocated capture target {}", path.display());
                    return Ok(ImageRef::from_path(path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Decodes the photo behind `image`, guessing the format from its content.
pub fn load_bitmap(image: &ImageRef) -> Result<RgbaImage, PreviewError> {
    let decoded = ImageReader::open(image.path())?
        .with_guessed_format()?
        .decode()?;
    Ok(decoded.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_timestamp_name(name: &str) -> bool {
        let Some(body) = name.strip_prefix("JPEG_") else {
            return false;
        };
        let Some(stamp) = body.get(..15) else {
            return false;
        };
        stamp.len() == 15
            && stamp.chars().enumerate().all(|(i, c)| {
                if i == 8 {
                    c == '_'
                } else {
                    c.is_ascii_digit()
                }
            })
            && name.ends_with(".jpg")
    }

    #[test]
    fn capture_target_is_an_empty_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("cache")).unwrap();
        let target = store.create_capture_target().unwrap();

        let name = target.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(is_timestamp_name(&name), "unexpected name {name}");
        assert!(name.ends_with("_.jpg"));
        assert_eq!(fs::metadata(target.path()).unwrap().len(), 0);
        assert!(target.path().starts_with(store.cache_dir()));
    }

    #[test]
    fn targets_in_the_same_second_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path()).unwrap();
        let targets: Vec<_> = (0..4)
            .map(|_| store.create_capture_target().unwrap())
            .collect();
        for (i, a) in targets.iter().enumerate() {
            for b in &targets[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);
    }

    #[test]
    fn load_bitmap_reports_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path()).unwrap();
        let target = store.create_capture_target().unwrap();
        assert!(load_bitmap(&target).is_err());
    }

    #[test]
    fn load_bitmap_ignores_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        RgbaImage::from_pixel(4, 3, image::Rgba([9, 8, 7, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        let bitmap = load_bitmap(&ImageRef::from_path(&path)).unwrap();
        assert_eq!(bitmap.dimensions(), (4, 3));
        assert_eq!(bitmap.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }
}
