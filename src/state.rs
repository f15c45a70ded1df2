use image::RgbaImage;
use std::sync::Arc;

use crate::types::ImageRef;

/// Result of the current preview session.
#[derive(Debug, Clone, Default)]
pub enum RenderState {
    #[default]
    Pending,
    Failed(String),
    Succeeded(Arc<RgbaImage>),
}

impl RenderState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RenderState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

// Bitmaps compare by identity; a fresh render is a different result even if pixels match.
impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RenderState::Pending, RenderState::Pending) => true,
            (RenderState::Failed(a), RenderState::Failed(b)) => a == b,
            (RenderState::Succeeded(a), RenderState::Succeeded(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// One-shot signals from the coordinator to whoever drives the camera and the screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Ask the capture facility to write a photo into this target.
    LaunchCamera(ImageRef),
    /// A photo landed in this target; open the preview.
    NavigateToPreview(ImageRef),
    /// The capture was cancelled or failed. Nothing further happens.
    CaptureAbandoned,
    /// No capture target could be allocated.
    CaptureUnavailable(String),
}

/// Where the coordinator is in the capture/preview cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturePhase {
    Idle,
    AwaitingCapture(ImageRef),
    Preview(RenderState),
}
