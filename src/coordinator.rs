//! Capture → detect → render coordination.
//!
//! The coordinator owns the pending capture target and the render state of the
//! current preview session. Every preview session carries an epoch; a pipeline
//! that finishes after its session was dismissed or replaced is dropped.

use image::RgbaImage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Messages;
use crate::detector::{log_face_mesh, FaceMeshDetector};
use crate::error::{CaptureError, PreviewError};
use crate::overlay::OverlayRenderer;
use crate::state::{CapturePhase, CoordinatorEvent, RenderState};
use crate::store::{load_bitmap, ImageStore};
use crate::types::ImageRef;

#[derive(Debug, Default)]
struct Session {
    pending_target: Option<ImageRef>,
    epoch: u64,
    preview_active: bool,
}

pub struct CaptureCoordinator {
    store: ImageStore,
    detector: Arc<dyn FaceMeshDetector>,
    renderer: Arc<dyn OverlayRenderer>,
    messages: Messages,
    session: Arc<Mutex<Session>>,
    state: Arc<watch::Sender<RenderState>>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CaptureCoordinator {
    pub fn new(
        store: ImageStore,
        detector: Arc<dyn FaceMeshDetector>,
        renderer: Arc<dyn OverlayRenderer>,
        messages: Messages,
    ) -> (Self, mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(RenderState::Pending);
        let coordinator = Self {
            store,
            detector,
            renderer,
            messages,
            session: Arc::new(Mutex::new(Session::default())),
            state: Arc::new(state),
            events,
        };
        (coordinator, events_rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.state.subscribe()
    }

    pub fn render_state(&self) -> RenderState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> CapturePhase {
        let session = lock(&self.session);
        if let Some(target) = &session.pending_target {
            CapturePhase::AwaitingCapture(target.clone())
        } else if session.preview_active {
            CapturePhase::Preview(self.render_state())
        } else {
            CapturePhase::Idle
        }
    }

    /// Allocates a capture target and asks for the camera to be launched on it.
    pub fn request_capture(&self) -> Result<ImageRef, CaptureError> {
        let target = match self.store.create_capture_target() {
            Ok(target) => target,
            Err(e) => {
                let reason = e.to_string();
                log::error!("{reason}");
                self.state.send_replace(RenderState::Failed(reason.clone()));
                self.emit(CoordinatorEvent::CaptureUnavailable(reason));
                return Err(e);
            }
        };

        let replaced = lock(&self.session).pending_target.replace(target.clone());
        if let Some(stale) = replaced {
            log::debug!("dropping unanswered capture target {stale}");
        }
        log::info!("capture requested into {target}");
        self.emit(CoordinatorEvent::LaunchCamera(target.clone()));
        Ok(target)
    }

    /// Consumes the pending target with the camera's verdict.
    pub fn on_capture_result(&self, success: bool) {
        let Some(target) = lock(&self.session).pending_target.take() else {
            log::warn!("capture result ({success}) without a pending capture target, ignoring");
            return;
        };

        if success {
            log::info!("photo captured into {target}");
            self.emit(CoordinatorEvent::NavigateToPreview(target));
        } else {
            log::info!("capture into {target} was cancelled or failed");
            self.emit(CoordinatorEvent::CaptureAbandoned);
        }
    }

    /// Starts a preview session for `image` and runs decode → detect → render
    /// on the blocking pool. Must be called from within a tokio runtime.
    pub fn start_preview(&self, image: ImageRef) -> JoinHandle<()> {
        let token = {
            let mut session = lock(&self.session);
            session.epoch += 1;
            session.preview_active = true;
            session.epoch
        };
        self.state.send_replace(RenderState::Pending);
        log::info!("preview session {token} started for {image}");

        let detector = self.detector.clone();
        let renderer = self.renderer.clone();
        let messages = self.messages.clone();
        let session = self.session.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let job = tokio::task::spawn_blocking(move || {
                run_pipeline(detector.as_ref(), renderer.as_ref(), &image)
            });
            let next = match job.await {
                Ok(Ok(bitmap)) => RenderState::Succeeded(Arc::new(bitmap)),
                Ok(Err(PreviewError::NoFace)) => RenderState::Failed(messages.no_face.clone()),
                Ok(Err(e)) => RenderState::Failed(describe(&e.to_string(), &messages)),
                Err(e) => {
                    log::error!("preview pipeline aborted: {e}");
                    RenderState::Failed(messages.unknown_error.clone())
                }
            };
            publish(&session, &state, token, next);
        })
    }

    /// Ends the preview session and resets the render state.
    pub fn dismiss_preview(&self) {
        {
            let mut session = lock(&self.session);
            session.epoch += 1;
            session.preview_active = false;
        }
        self.state.send_replace(RenderState::Pending);
        log::debug!("preview dismissed");
    }

    fn emit(&self, event: CoordinatorEvent) {
        if self.events.send(event).is_err() {
            log::debug!("no listener for coordinator events");
        }
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn describe(reason: &str, messages: &Messages) -> String {
    if reason.trim().is_empty() {
        messages.unknown_error.clone()
    } else {
        reason.to_string()
    }
}

fn run_pipeline(
    detector: &dyn FaceMeshDetector,
    renderer: &dyn OverlayRenderer,
    image: &ImageRef,
) -> Result<RgbaImage, PreviewError> {
    let photo = load_bitmap(image)?;
    let faces = detector.detect(image);
    log_face_mesh(&faces);
    if faces.is_empty() {
        return Err(PreviewError::NoFace);
    }
    Ok(renderer.render_mesh(&photo, &faces))
}

/// Writes a pipeline result if its session is still current and undecided.
fn publish(
    session: &Mutex<Session>,
    state: &watch::Sender<RenderState>,
    token: u64,
    next: RenderState,
) {
    let session = lock(session);
    if session.epoch != token || !session.preview_active {
        log::debug!("discarding result of stale preview session {token}");
        return;
    }
    let applied = state.send_if_modified(|current| {
        if current.is_pending() {
            *current = next;
            true
        } else {
            false
        }
    });
    if applied {
        log::info!("preview session {token} finished");
    }
}
