use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of landmarks in a full face mesh.
pub const MESH_POINT_COUNT: usize = 468;

/// Represents a single 3D point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    /// Depth relative to the face centre, not pixels.
    pub z: f32,
}

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest rectangle containing every point, or an empty rect at the origin.
    pub fn enclosing(points: &[Point3D]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}) {:.1}x{:.1}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Three landmark indices forming one mesh facet.
pub type Triangle = [usize; 3];

/// One face returned by a detector: landmarks, their triangulation and a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    points: Vec<Point3D>,
    triangles: Vec<Triangle>,
    bounding_box: Rect,
}

impl DetectedFace {
    pub fn new(points: Vec<Point3D>, triangles: Vec<Triangle>, bounding_box: Rect) -> Self {
        Self {
            points,
            triangles,
            bounding_box,
        }
    }

    pub fn from_mesh(points: Vec<Point3D>, triangles: Vec<Triangle>) -> Self {
        let bounding_box = Rect::enclosing(&points);
        Self::new(points, triangles, bounding_box)
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }

    /// Resolves a triangle to its corner points. `None` if any index is out of range.
    pub fn triangle_points(&self, triangle: &Triangle) -> Option<[Point3D; 3]> {
        Some([
            *self.points.get(triangle[0])?,
            *self.points.get(triangle[1])?,
            *self.points.get(triangle[2])?,
        ])
    }
}

/// Locator for an image file, either a capture target or an already written photo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    path: PathBuf,
}

impl ImageRef {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
