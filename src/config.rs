use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub overlay: OverlayConfig,
    pub detector: DetectorConfig,
    pub messages: Messages,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub mesh_color_hex: String, // e.g. "#00FFFF"
    pub stroke_width: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// "sidecar" or "onnx"
    pub kind: String,
    pub sidecar_suffix: String,
    pub mesh_model: PathBuf,
    pub region_model: PathBuf,
    pub tessellation: PathBuf,
}

/// User-facing texts for failed preview sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub no_face: String,
    pub unknown_error: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_path: PathBuf::from("mesh_preview.png"),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            mesh_color_hex: "#00FFFF".to_string(),
            stroke_width: 3.0,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: "sidecar".to_string(),
            sidecar_suffix: ".mesh.json".to_string(),
            mesh_model: PathBuf::from("models/face_mesh.onnx"),
            region_model: PathBuf::from("models/face_detection.onnx"),
            tessellation: PathBuf::from("models/face_mesh_tessellation.json"),
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            no_face: "얼굴을 감지하지 못했습니다.".to_string(),
            unknown_error: "알 수 없는 오류".to_string(),
        }
    }
}

impl AppConfig {
    pub const DEFAULT_PATH: &'static str = "config.json";

    /// Loads the config at `path`, falling back to defaults when it is missing or
    /// unparsable. The merged result is written back so new fields show up in the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(c) => {
                    log::info!("Loaded configuration from {}", path.display());
                    c
                }
                Err(e) => {
                    log::warn!("Error parsing config: {}. Loading defaults.", e);
                    Self::default()
                }
            }
        } else {
            log::info!(
                "Configuration file not found. Creating default at {}",
                path.display()
            );
            Self::default()
        };

        config.save_to(path)?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
