use anyhow::{bail, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::camera::CaptureFacility;
use crate::coordinator::CaptureCoordinator;
use crate::presenter::PreviewSurface;
use crate::state::{CoordinatorEvent, RenderState};
use crate::types::ImageRef;

/// How a capture or preview session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Rendered,
    NoPreview(String),
    Abandoned,
}

/// Runs one full cycle: request a capture, hand the target to the camera, then
/// preview whatever was captured.
pub async fn run_capture_session<C, S>(
    coordinator: &CaptureCoordinator,
    events: &mut UnboundedReceiver<CoordinatorEvent>,
    camera: &mut C,
    surface: &mut S,
) -> Result<SessionOutcome>
where
    C: CaptureFacility + ?Sized,
    S: PreviewSurface + ?Sized,
{
    if let Err(e) = coordinator.request_capture() {
        log::debug!("capture request failed: {e}");
    }

    while let Some(event) = events.recv().await {
        match event {
            CoordinatorEvent::LaunchCamera(target) => {
                let success = camera.capture(&target).unwrap_or_else(|e| {
                    log::warn!("capture into {target} failed: {e:#}");
                    false
                });
                coordinator.on_capture_result(success);
            }
            CoordinatorEvent::NavigateToPreview(photo) => {
                return run_preview_session(coordinator, photo, surface).await;
            }
            CoordinatorEvent::CaptureAbandoned => {
                surface.notice("Capture cancelled, no photo taken.");
                return Ok(SessionOutcome::Abandoned);
            }
            CoordinatorEvent::CaptureUnavailable(reason) => {
                surface.show(&RenderState::Failed(reason.clone()))?;
                return Ok(SessionOutcome::NoPreview(reason));
            }
        }
    }
    bail!("coordinator event channel closed")
}

/// Previews an existing photo until the pipeline settles, then dismisses the session.
pub async fn run_preview_session<S>(
    coordinator: &CaptureCoordinator,
    photo: ImageRef,
    surface: &mut S,
) -> Result<SessionOutcome>
where
    S: PreviewSurface + ?Sized,
{
    let mut updates = coordinator.subscribe();
    let pipeline = coordinator.start_preview(photo);
    surface.show(&RenderState::Pending)?;

    let settled = loop {
        let current = updates.borrow_and_update().clone();
        if current.is_terminal() {
            break current;
        }
        if updates.changed().await.is_err() {
            break coordinator.render_state();
        }
    };
    if let Err(e) = pipeline.await {
        log::warn!("preview task did not finish cleanly: {e}");
    }

    surface.show(&settled)?;
    coordinator.dismiss_preview();

    Ok(match settled {
        RenderState::Succeeded(_) => SessionOutcome::Rendered,
        RenderState::Failed(reason) => SessionOutcome::NoPreview(reason),
        RenderState::Pending => SessionOutcome::NoPreview("preview did not finish".to_string()),
    })
}
