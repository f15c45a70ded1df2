//! # mesh-snap
//!
//! Take a photo, run face-mesh landmark detection on it and preview the mesh
//! drawn over the photo.
//!
//! The [`coordinator::CaptureCoordinator`] drives the cycle:
//!
//! 1. `request_capture` allocates a target in the [`store::ImageStore`] and emits
//!    [`state::CoordinatorEvent::LaunchCamera`]
//! 2. the caller hands the target to a [`camera::CaptureFacility`] and reports back
//!    through `on_capture_result`
//! 3. `start_preview` decodes the photo, runs the [`detector::FaceMeshDetector`] and,
//!    when a face was found, composites the mesh with an [`overlay::OverlayRenderer`]
//! 4. the outcome is published as a [`state::RenderState`] for a
//!    [`presenter::PreviewSurface`] to show
//!
//! Detector, renderer, camera and surface are traits so each can be swapped for a fake.

pub mod app;
pub mod camera;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
#[cfg(feature = "onnx")]
pub mod inference;
pub mod overlay;
pub mod presenter;
pub mod state;
pub mod store;
pub mod types;

pub use coordinator::CaptureCoordinator;
pub use detector::{create_detector, FaceMeshDetector, SidecarMeshDetector};
pub use error::{CaptureError, ConfigError, PreviewError};
pub use overlay::{MeshOverlay, OverlayRenderer};
pub use state::{CapturePhase, CoordinatorEvent, RenderState};
pub use store::ImageStore;
pub use types::{DetectedFace, ImageRef, Point3D, Rect, Triangle, MESH_POINT_COUNT};
