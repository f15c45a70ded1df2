use image::{Rgb, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use mesh_snap::config::Messages;
use mesh_snap::{
    CaptureCoordinator, CapturePhase, CoordinatorEvent, DetectedFace, FaceMeshDetector, ImageRef,
    ImageStore, MeshOverlay, OverlayRenderer, Point3D, RenderState, MESH_POINT_COUNT,
};

/// Returns the same faces for every photo; photos registered in `gates` block until released.
#[derive(Default)]
struct FakeDetector {
    faces: Vec<DetectedFace>,
    gates: Mutex<HashMap<ImageRef, mpsc::Receiver<Vec<DetectedFace>>>>,
    calls: AtomicUsize,
}

impl FakeDetector {
    fn returning(faces: Vec<DetectedFace>) -> Self {
        Self {
            faces,
            ..Self::default()
        }
    }

    fn gate(&self, image: &ImageRef) -> mpsc::Sender<Vec<DetectedFace>> {
        let (tx, rx) = mpsc::channel();
        self.gates.lock().unwrap().insert(image.clone(), rx);
        tx
    }
}

impl FaceMeshDetector for FakeDetector {
    fn name(&self) -> String {
        "fake".to_string()
    }

    fn detect(&self, image: &ImageRef) -> Vec<DetectedFace> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(image);
        match gate {
            Some(rx) => rx.recv().unwrap_or_default(),
            None => self.faces.clone(),
        }
    }
}

#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
    inner: MeshOverlay,
}

impl OverlayRenderer for CountingRenderer {
    fn render_mesh(&self, photo: &RgbaImage, faces: &[DetectedFace]) -> RgbaImage {
        assert!(!faces.is_empty(), "renderer called without faces");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.render_mesh(photo, faces)
    }
}

/// A ring of 468 landmarks with a fan triangulation around point 0.
fn full_mesh(cx: f32, cy: f32) -> DetectedFace {
    let points: Vec<Point3D> = (0..MESH_POINT_COUNT)
        .map(|i| {
            let angle = i as f32 / MESH_POINT_COUNT as f32 * std::f32::consts::TAU;
            Point3D::new(cx + angle.cos() * 20.0, cy + angle.sin() * 20.0, 0.0)
        })
        .collect();
    let triangles = (1..MESH_POINT_COUNT - 1).map(|i| [0, i, i + 1]).collect();
    DetectedFace::from_mesh(points, triangles)
}

fn write_photo(path: &Path) {
    RgbImage::from_pixel(64, 64, Rgb([90, 90, 90]))
        .save(path)
        .unwrap();
}

struct Harness {
    coordinator: CaptureCoordinator,
    events: tokio::sync::mpsc::UnboundedReceiver<CoordinatorEvent>,
    detector: Arc<FakeDetector>,
    renderer: Arc<CountingRenderer>,
    _dir: tempfile::TempDir,
    dir_path: std::path::PathBuf,
}

fn harness(detector: FakeDetector) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let dir_path = dir.path().to_path_buf();
    let detector = Arc::new(detector);
    let renderer = Arc::new(CountingRenderer::default());
    let (coordinator, events) = CaptureCoordinator::new(
        ImageStore::new(dir.path().join("cache")).unwrap(),
        detector.clone(),
        renderer.clone(),
        Messages::default(),
    );
    Harness {
        coordinator,
        events,
        detector,
        renderer,
        _dir: dir,
        dir_path,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_capture_renders_the_mesh() {
    let mut h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));

    let target = h.coordinator.request_capture().unwrap();
    assert_eq!(
        h.events.recv().await,
        Some(CoordinatorEvent::LaunchCamera(target.clone()))
    );
    assert_eq!(
        h.coordinator.phase(),
        CapturePhase::AwaitingCapture(target.clone())
    );

    write_photo(target.path());
    h.coordinator.on_capture_result(true);
    assert_eq!(
        h.events.recv().await,
        Some(CoordinatorEvent::NavigateToPreview(target.clone()))
    );
    assert_eq!(h.coordinator.phase(), CapturePhase::Idle);

    h.coordinator.start_preview(target).await.unwrap();

    let RenderState::Succeeded(bitmap) = h.coordinator.render_state() else {
        panic!("expected a rendered preview, got {:?}", h.coordinator.render_state());
    };
    assert_eq!(bitmap.dimensions(), (64, 64));
    assert_ne!(bitmap.get_pixel(52, 32).0, [90, 90, 90, 255]);
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        h.coordinator.phase(),
        CapturePhase::Preview(RenderState::Succeeded(_))
    ));
}

#[tokio::test]
async fn failed_capture_never_navigates() {
    let mut h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));

    let target = h.coordinator.request_capture().unwrap();
    h.coordinator.on_capture_result(false);
    // A late duplicate verdict must not resurrect the target.
    h.coordinator.on_capture_result(true);

    assert_eq!(
        h.events.recv().await,
        Some(CoordinatorEvent::LaunchCamera(target))
    );
    assert_eq!(h.events.recv().await, Some(CoordinatorEvent::CaptureAbandoned));
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.coordinator.phase(), CapturePhase::Idle);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_target_per_request() {
    let h = harness(FakeDetector::default());

    for _ in 0..3 {
        h.coordinator.request_capture().unwrap();
        h.coordinator.on_capture_result(false);
    }

    let files = std::fs::read_dir(h.dir_path.join("cache")).unwrap().count();
    assert_eq!(files, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_face_fails_without_rendering() {
    let h = harness(FakeDetector::returning(Vec::new()));
    let photo = h.dir_path.join("empty.jpg");
    write_photo(&photo);

    h.coordinator
        .start_preview(ImageRef::from_path(&photo))
        .await
        .unwrap();

    assert_eq!(
        h.coordinator.render_state(),
        RenderState::Failed("얼굴을 감지하지 못했습니다.".to_string())
    );
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_photo_fails_the_session() {
    let h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));
    let photo = h.dir_path.join("broken.jpg");
    std::fs::write(&photo, b"definitely not a jpeg").unwrap();

    h.coordinator
        .start_preview(ImageRef::from_path(&photo))
        .await
        .unwrap();

    let RenderState::Failed(reason) = h.coordinator.render_state() else {
        panic!("expected failure");
    };
    assert!(!reason.is_empty());
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn dismiss_resets_to_pending() {
    let h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));
    let photo = h.dir_path.join("face.jpg");
    write_photo(&photo);

    h.coordinator
        .start_preview(ImageRef::from_path(&photo))
        .await
        .unwrap();
    assert!(h.coordinator.render_state().is_terminal());

    h.coordinator.dismiss_preview();
    assert_eq!(h.coordinator.render_state(), RenderState::Pending);
    assert_eq!(h.coordinator.phase(), CapturePhase::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_pipeline_cannot_overwrite_newer_session() {
    let h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));
    let slow = ImageRef::from_path(h.dir_path.join("slow.jpg"));
    let fast = ImageRef::from_path(h.dir_path.join("fast.jpg"));
    write_photo(slow.path());
    write_photo(fast.path());
    let release_slow = h.detector.gate(&slow);

    let mut updates = h.coordinator.subscribe();
    let first = h.coordinator.start_preview(slow);
    h.coordinator.dismiss_preview();
    assert_eq!(*updates.borrow_and_update(), RenderState::Pending);

    h.coordinator.start_preview(fast).await.unwrap();
    let winner = h.coordinator.render_state();
    assert!(matches!(winner, RenderState::Succeeded(_)));

    // The first session finishes late with nothing found; it must be discarded.
    release_slow.send(Vec::new()).unwrap();
    first.await.unwrap();
    assert_eq!(h.coordinator.render_state(), winner);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_finishing_after_dismiss_is_dropped() {
    let h = harness(FakeDetector::returning(vec![full_mesh(32.0, 32.0)]));
    let photo = ImageRef::from_path(h.dir_path.join("late.jpg"));
    write_photo(photo.path());
    let release = h.detector.gate(&photo);

    let pipeline = h.coordinator.start_preview(photo);
    h.coordinator.dismiss_preview();
    release.send(vec![full_mesh(32.0, 32.0)]).unwrap();
    pipeline.await.unwrap();

    assert_eq!(h.coordinator.render_state(), RenderState::Pending);
    assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
}
