use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::config::OverlayConfig;
use crate::types::{DetectedFace, Point3D};

pub const DEFAULT_MESH_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
pub const DEFAULT_STROKE_WIDTH: f32 = 3.0;
/// Widest stroke accepted from configuration.
pub const MAX_STROKE_WIDTH: f32 = 32.0;

/// Composites detection results onto a photo.
pub trait OverlayRenderer: Send + Sync {
    fn render_mesh(&self, photo: &RgbaImage, faces: &[DetectedFace]) -> RgbaImage;
}

/// Draws every mesh triangle as three line segments in photo pixel space.
#[derive(Debug, Clone)]
pub struct MeshOverlay {
    color: Rgba<u8>,
    stroke_width: f32,
    // Pixel offsets stamped along each segment to give it width.
    brush: Vec<(f32, f32)>,
}

impl MeshOverlay {
    pub fn new(color: Rgba<u8>, stroke_width: f32) -> Self {
        // max before min so NaN lands on the lower bound.
        let stroke_width = stroke_width.max(1.0).min(MAX_STROKE_WIDTH);
        Self {
            color,
            stroke_width,
            brush: disc_offsets(stroke_width / 2.0),
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        let (r, g, b) = parse_hex(&config.mesh_color_hex);
        Self::new(Rgba([r, g, b, 255]), config.stroke_width)
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    fn draw_segment(&self, canvas: &mut RgbaImage, a: Point3D, b: Point3D) {
        for &(dx, dy) in &self.brush {
            draw_line_segment_mut(canvas, (a.x + dx, a.y + dy), (b.x + dx, b.y + dy), self.color);
        }
    }
}

impl Default for MeshOverlay {
    fn default() -> Self {
        Self::new(DEFAULT_MESH_COLOR, DEFAULT_STROKE_WIDTH)
    }
}

impl OverlayRenderer for MeshOverlay {
    fn render_mesh(&self, photo: &RgbaImage, faces: &[DetectedFace]) -> RgbaImage {
        let mut canvas = photo.clone();
        for face in faces {
            for triangle in face.triangles() {
                // Landmarks are already in photo coordinates, no transform needed.
                let Some([p1, p2, p3]) = face.triangle_points(triangle) else {
                    continue;
                };
                self.draw_segment(&mut canvas, p1, p2);
                self.draw_segment(&mut canvas, p2, p3);
                self.draw_segment(&mut canvas, p3, p1);
            }
        }
        canvas
    }
}

/// Integer offsets inside a disc of the given radius, always including the centre.
fn disc_offsets(radius: f32) -> Vec<(f32, f32)> {
    let reach = radius.floor() as i32;
    let mut offsets = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let (fx, fy) = (dx as f32, dy as f32);
            if fx * fx + fy * fy <= radius * radius {
                offsets.push((fx, fy));
            }
        }
    }
    if offsets.is_empty() {
        offsets.push((0.0, 0.0));
    }
    offsets
}

/// Parses `#RRGGBB`. Anything else falls back to cyan.
pub fn parse_hex(hex: &str) -> (u8, u8, u8) {
    let [r, g, b, _] = DEFAULT_MESH_COLOR.0;
    if hex.len() != 7 || !hex.starts_with('#') {
        return (r, g, b);
    }
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
    };
    match (channel(1..3), channel(3..5), channel(5..7)) {
        (Some(r), Some(g), Some(b)) => (r, g, b),
        _ => (r, g, b),
    }
}
