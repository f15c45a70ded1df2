use image::ImageReader;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::types::{DetectedFace, ImageRef, Point3D, Rect, Triangle, MESH_POINT_COUNT};

/// Face-mesh detection on a photo.
///
/// Implementations never fail: an undecodable photo and a photo without a face
/// both come back as an empty list. Calls may block for a long time, so callers
/// keep them off the async executor.
pub trait FaceMeshDetector: Send + Sync {
    fn name(&self) -> String;
    fn detect(&self, image: &ImageRef) -> Vec<DetectedFace>;
}

pub fn create_detector(config: &DetectorConfig) -> Result<Arc<dyn FaceMeshDetector>, ConfigError> {
    match config.kind.as_str() {
        "sidecar" => Ok(Arc::new(SidecarMeshDetector::new(&config.sidecar_suffix))),
        #[cfg(feature = "onnx")]
        "onnx" => Ok(Arc::new(crate::inference::OnnxFaceMesh::new(config)?)),
        #[cfg(not(feature = "onnx"))]
        "onnx" => Err(ConfigError::FeatureDisabled("onnx".to_string(), "onnx")),
        other => Err(ConfigError::UnknownDetector(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct SidecarFile {
    #[serde(default)]
    faces: Vec<SidecarFace>,
}

#[derive(Debug, Deserialize)]
struct SidecarFace {
    points: Vec<[f32; 3]>,
    #[serde(default)]
    triangles: Vec<Triangle>,
    bounding_box: Option<Rect>,
}

impl From<SidecarFace> for DetectedFace {
    fn from(face: SidecarFace) -> Self {
        let points: Vec<Point3D> = face
            .points
            .into_iter()
            .map(|[x, y, z]| Point3D::new(x, y, z))
            .collect();
        match face.bounding_box {
            Some(rect) => DetectedFace::new(points, face.triangles, rect),
            None => DetectedFace::from_mesh(points, face.triangles),
        }
    }
}

/// Reads a mesh precomputed by an external tool from `<photo><suffix>`.
#[derive(Debug, Clone)]
pub struct SidecarMeshDetector {
    suffix: String,
}

impl SidecarMeshDetector {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
        }
    }

    pub fn sidecar_path(&self, image: &ImageRef) -> PathBuf {
        let mut name = image.path().as_os_str().to_owned();
        name.push(&self.suffix);
        PathBuf::from(name)
    }
}

impl FaceMeshDetector for SidecarMeshDetector {
    fn name(&self) -> String {
        "Face Mesh (sidecar)".to_string()
    }

    fn detect(&self, image: &ImageRef) -> Vec<DetectedFace> {
        // Sniff the format from content, the way the preview decode does.
        let dimensions = ImageReader::open(image.path())
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::from)
            .and_then(|reader| reader.into_dimensions());
        if let Err(e) = dimensions {
            log::warn!("cannot decode {}: {}", image, e);
            return Vec::new();
        }

        let path = self.sidecar_path(image);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("no mesh sidecar at {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<SidecarFile>(&content) {
            Ok(file) => file.faces.into_iter().map(DetectedFace::from).collect(),
            Err(e) => {
                log::warn!("invalid mesh sidecar {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

const KEY_POINTS: [(usize, &str); 6] = [
    (0, "nose tip"),
    (10, "forehead centre"),
    (61, "left mouth corner"),
    (291, "right mouth corner"),
    (130, "left eye"),
    (359, "right eye"),
];

/// Writes a per-face summary of a detection result to the debug log.
pub fn log_face_mesh(faces: &[DetectedFace]) {
    if faces.is_empty() {
        log::debug!("no face detected");
        return;
    }

    log::debug!("--- {} face(s) detected ---", faces.len());
    for (index, face) in faces.iter().enumerate() {
        let points = face.points();
        log::debug!(" [face {}]", index + 1);
        if points.len() == MESH_POINT_COUNT {
            log::debug!("  - points: {}", points.len());
        } else {
            log::warn!(
                "face {} has {} points, expected {}",
                index + 1,
                points.len(),
                MESH_POINT_COUNT
            );
        }
        for (i, label) in KEY_POINTS {
            if let Some(p) = points.get(i) {
                log::debug!("    - point [{i}] ({label}): (x: {}, y: {}, z: {})", p.x, p.y, p.z);
            }
        }
        log::debug!("  - triangles: {}", face.triangles().len());
        log::debug!("  - bounding box: {}", face.bounding_box());
    }
}
