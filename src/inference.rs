use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, ImageBuffer, Rgb};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::config::DetectorConfig;
use crate::detector::FaceMeshDetector;
use crate::error::ConfigError;
use crate::store::load_bitmap;
use crate::types::{DetectedFace, ImageRef, Point3D, Rect, Triangle, MESH_POINT_COUNT};

type RgbFrame = ImageBuffer<Rgb<u8>, Vec<u8>>;

const MESH_INPUT: u32 = 192;
const REGION_WIDTH: u32 = 320;
const REGION_HEIGHT: u32 = 240;
const REGION_SCORE_THRESHOLD: f32 = 0.7;

fn open_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// UltraFace region proposal used to crop the face before mesh inference.
struct RegionDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
}

impl RegionDetector {
    fn new(model_path: &Path) -> Result<Self> {
        let session = open_session(model_path)?;
        let anchors = generate_anchors(REGION_WIDTH as usize, REGION_HEIGHT as usize);
        Ok(Self { session, anchors })
    }

    fn detect(&mut self, frame: &RgbFrame) -> Result<Option<Rect>> {
        let resized = image::imageops::resize(frame, REGION_WIDTH, REGION_HEIGHT, FilterType::Triangle);

        // NCHW, normalised as (pixel - 127) / 128
        let plane = (REGION_WIDTH * REGION_HEIGHT) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..3 {
                input_data[c * plane + i] = (pixel[c] as f32 - 127.0) / 128.0;
            }
        }

        let shape = vec![1, 3, REGION_HEIGHT as usize, REGION_WIDTH as usize];
        let input_tensor = Tensor::from_array((shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_scores_shape, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_boxes_shape, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;

        let Some(rect) = best_region(&self.anchors, scores, boxes, REGION_SCORE_THRESHOLD) else {
            return Ok(None);
        };

        let sx = frame.width() as f32 / REGION_WIDTH as f32;
        let sy = frame.height() as f32 / REGION_HEIGHT as f32;
        Ok(Some(Rect::new(
            rect.x * sx,
            rect.y * sy,
            rect.width * sx,
            rect.height * sy,
        )))
    }
}

/// Highest scoring anchor above `threshold`, decoded into 320x240 pixel space.
fn best_region(
    anchors: &[(f32, f32, f32, f32)],
    scores: &[f32],
    boxes: &[f32],
    threshold: f32,
) -> Option<Rect> {
    let center_variance = 0.1;
    let size_variance = 0.2;

    let mut best_score = 0.0;
    let mut best_rect = None;
    for (i, &(ax, ay, aw, ah)) in anchors.iter().enumerate() {
        let (Some(&score), Some(enc)) = (scores.get(i * 2 + 1), boxes.get(i * 4..i * 4 + 4)) else {
            break;
        };
        if score > threshold && score > best_score {
            let cx = enc[0] * center_variance * aw + ax;
            let cy = enc[1] * center_variance * ah + ay;
            let w = (enc[2] * size_variance).exp() * aw;
            let h = (enc[3] * size_variance).exp() * ah;

            best_score = score;
            best_rect = Some(Rect::new(
                (cx - w / 2.0) * REGION_WIDTH as f32,
                (cy - h / 2.0) * REGION_HEIGHT as f32,
                w * REGION_WIDTH as f32,
                h * REGION_HEIGHT as f32,
            ));
        }
    }
    best_rect
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [
        &[10.0, 16.0, 24.0],
        &[32.0, 48.0],
        &[64.0, 96.0],
        &[128.0, 192.0, 256.0],
    ];
    let mut anchors = Vec::new();

    let w = width as f32;
    let h = height as f32;

    for (i, &shrinkage) in shrinkage_list.iter().enumerate() {
        let s = shrinkage as f32;
        let feature_h = (h / s).ceil() as usize;
        let feature_w = (w / s).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * s + s / 2.0) / w;
                let cy = (v as f32 * s + s / 2.0) / h;
                for &min_box in min_boxes[i] {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}

/// Crop window around a detected face, padded by a quarter and clipped to the frame.
fn padded_crop(rect: Rect, frame_w: f32, frame_h: f32) -> Rect {
    let pad_w = rect.width * 0.25;
    let pad_h = rect.height * 0.25;
    let x = (rect.x - pad_w / 2.0).max(0.0);
    let y = (rect.y - pad_h / 2.0).max(0.0);
    let w = (rect.width + pad_w).min(frame_w - x);
    let h = (rect.height + pad_h).min(frame_h - y);
    Rect::new(x, y, w, h)
}

struct Sessions {
    mesh: Session,
    region: Option<RegionDetector>,
}

/// 468-point face mesh model run through ONNX Runtime.
pub struct OnnxFaceMesh {
    sessions: Mutex<Sessions>,
    triangles: Vec<Triangle>,
}

impl OnnxFaceMesh {
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&config.tessellation)?;
        let triangles: Vec<Triangle> = serde_json::from_str(&content)?;

        let mesh = open_session(&config.mesh_model)
            .map_err(|e| ConfigError::Model(format!("{}: {e}", config.mesh_model.display())))?;

        let region = if config.region_model.exists() {
            log::info!("Loading face region detector from {}", config.region_model.display());
            match RegionDetector::new(&config.region_model) {
                Ok(detector) => Some(detector),
                Err(e) => {
                    log::warn!("Face region detector unavailable: {e}. Using the full frame.");
                    None
                }
            }
        } else {
            log::warn!("Face region detector not found. Accuracy will be poor.");
            None
        };

        Ok(Self {
            sessions: Mutex::new(Sessions { mesh, region }),
            triangles,
        })
    }

    fn infer(&self, frame: &RgbFrame) -> Result<Vec<DetectedFace>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("inference session poisoned"))?;

        let (frame_w, frame_h) = (frame.width() as f32, frame.height() as f32);
        let crop = match sessions.region.as_mut() {
            Some(region) => match region.detect(frame)? {
                Some(rect) => padded_crop(rect, frame_w, frame_h),
                None => return Ok(Vec::new()),
            },
            None => Rect::new(0.0, 0.0, frame_w, frame_h),
        };

        let cropped = image::imageops::crop_imm(
            frame,
            crop.x as u32,
            crop.y as u32,
            crop.width as u32,
            crop.height as u32,
        )
        .to_image();
        let resized = image::imageops::resize(&cropped, MESH_INPUT, MESH_INPUT, FilterType::Triangle);

        let mut input_data = Vec::with_capacity((MESH_INPUT * MESH_INPUT * 3) as usize);
        for pixel in resized.pixels() {
            for c in 0..3 {
                input_data.push(pixel[c] as f32 / 127.5 - 1.0);
            }
        }

        let shape = vec![1, MESH_INPUT as usize, MESH_INPUT as usize, 3];
        let input = Tensor::from_array((shape, input_data))?;
        let outputs = sessions.mesh.run(ort::inputs![input])?;
        let (_shape, raw) = outputs[0].try_extract_tensor::<f32>()?;

        if raw.len() < MESH_POINT_COUNT * 3 {
            return Ok(Vec::new());
        }

        // Mesh space (0..192) -> crop -> full frame
        let scale_x = crop.width / MESH_INPUT as f32;
        let scale_y = crop.height / MESH_INPUT as f32;
        let points = raw
            .chunks_exact(3)
            .take(MESH_POINT_COUNT)
            .map(|v| Point3D::new(crop.x + v[0] * scale_x, crop.y + v[1] * scale_y, v[2]))
            .collect();

        Ok(vec![DetectedFace::from_mesh(points, self.triangles.clone())])
    }
}

impl FaceMeshDetector for OnnxFaceMesh {
    fn name(&self) -> String {
        "Face Mesh (468 pts, ONNX)".to_string()
    }

    fn detect(&self, image: &ImageRef) -> Vec<DetectedFace> {
        let frame = match load_bitmap(image) {
            Ok(bitmap) => image::DynamicImage::ImageRgba8(bitmap).to_rgb8(),
            Err(e) => {
                log::warn!("cannot decode {}: {}", image, e);
                return Vec::new();
            }
        };
        match self.infer(&frame).context("face mesh inference failed") {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("{e:#}");
                Vec::new()
            }
        }
    }
}
