use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::error::CaptureError;
use crate::capture::infrastructure::camera_source::CameraSource;
use crate::capture::infrastructure::image_source::ImageSource;
use crate::capture::infrastructure::video_source::VideoSource;
use crate::capture::jpeg::encode_jpeg;
use crate::detection::domain::detector::EmotionDetector;
use crate::detection::domain::face::Face;
use crate::detection::error::DetectionError;
use crate::overlay::manager::SurfaceManager;
use crate::overlay::renderer;
use crate::overlay::surface::Surface;
use crate::pipeline::events::SessionEvent;
use crate::pipeline::mode::Mode;
use crate::pipeline::poll_session::{PollSession, SessionParams};
use crate::shared::constants::{
    DEFAULT_POLL_INTERVAL_MS, REALTIME_JPEG_QUALITY, SNAPSHOT_JPEG_QUALITY,
};

/// Builds a fresh detector for each session or one-shot analyze.
pub type DetectorFactory = Box<dyn Fn() -> Box<dyn EmotionDetector> + Send>;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("no media loaded for {0} mode")]
    NoSource(Mode),
    #[error("a detection request is already in flight")]
    Busy,
}

/// One row of the displayed results list.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultEntry {
    pub emotion: String,
    pub confidence: Option<f32>,
}

pub struct ControllerConfig {
    pub interval: Duration,
    pub realtime_jpeg_quality: u8,
    pub snapshot_jpeg_quality: u8,
    /// Rendered box for overlays; `None` renders at source native size.
    pub display_size: Option<(u32, u32)>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            realtime_jpeg_quality: REALTIME_JPEG_QUALITY,
            snapshot_jpeg_quality: SNAPSHOT_JPEG_QUALITY,
            display_size: None,
        }
    }
}

/// The mode state machine owning every live resource of the pipeline.
///
/// Exactly one of image/video/camera is active. The controller exclusively
/// owns at most one camera handle and at most one poll session; switching
/// modes tears the outgoing mode's resources down, in order, before the new
/// mode can acquire anything — a dangling timer or camera stream must never
/// survive a switch.
pub struct ModeController {
    mode: Mode,
    config: ControllerConfig,
    detector_factory: DetectorFactory,
    surfaces: SurfaceManager,
    image_source: Option<Arc<Mutex<dyn FrameSource>>>,
    video_source: Option<Arc<Mutex<dyn FrameSource>>>,
    camera_source: Option<Arc<Mutex<dyn FrameSource>>>,
    session: Option<PollSession>,
    session_rx: Option<Receiver<SessionEvent>>,
    generation: u64,
    results: Vec<ResultEntry>,
    status: Option<String>,
}

impl ModeController {
    pub fn new(detector_factory: DetectorFactory, config: ControllerConfig) -> Self {
        Self {
            mode: Mode::default(),
            config,
            detector_factory,
            surfaces: SurfaceManager::new(),
            image_source: None,
            video_source: None,
            camera_source: None,
            session: None,
            session_rx: None,
            generation: 0,
            results: Vec::new(),
            status: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn results(&self) -> &[ResultEntry] {
        &self.results
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn surface(&self, mode: Mode) -> Option<&Surface> {
        self.surfaces.get(mode.slot_id())
    }

    pub fn is_polling(&self) -> bool {
        self.session.is_some()
    }

    /// Switches the active mode after tearing down everything the outgoing
    /// mode owned: poll session first (no further ticks), then video
    /// playback, then the camera stream, then overlay surfaces, then the
    /// displayed results.
    pub fn switch_mode(&mut self, mode: Mode) {
        self.stop_session();
        if let Some(video) = &self.video_source {
            if let Ok(mut v) = video.lock() {
                v.stop();
            }
        }
        self.release_camera();
        self.surfaces.release_all();
        self.results.clear();
        self.status = None;
        // Invalidate anything still in flight from the old binding.
        self.generation += 1;
        self.mode = mode;
        log::debug!("switched to {mode} mode");
    }

    // ── Image mode ───────────────────────────────────────────────────

    /// Loads a still image as the image-mode source.
    pub fn load_image(&mut self, path: &Path) -> Result<(), CaptureError> {
        let source = ImageSource::open(path)?;
        self.set_image_source(Arc::new(Mutex::new(source)));
        Ok(())
    }

    pub fn set_image_source(&mut self, source: Arc<Mutex<dyn FrameSource>>) {
        if self.mode != Mode::Image {
            self.switch_mode(Mode::Image);
        }
        self.image_source = Some(source);
    }

    // ── Video mode ───────────────────────────────────────────────────

    /// Loads a video file as the video-mode source.
    pub fn load_video(&mut self, path: &Path) -> Result<(), CaptureError> {
        let source = VideoSource::open(path)?;
        self.set_video_source(Arc::new(Mutex::new(source)));
        Ok(())
    }

    pub fn set_video_source(&mut self, source: Arc<Mutex<dyn FrameSource>>) {
        if self.mode != Mode::Video {
            self.switch_mode(Mode::Video);
        }
        self.video_source = Some(source);
    }

    /// Starts playback and the repeating detection loop over the video.
    pub fn start_video_analysis(&mut self) -> Result<(), AnalyzeError> {
        if self.mode != Mode::Video {
            return Err(AnalyzeError::NoSource(Mode::Video));
        }
        let source = self
            .video_source
            .clone()
            .ok_or(AnalyzeError::NoSource(Mode::Video))?;
        if let Ok(mut v) = source.lock() {
            v.play();
        }
        self.start_session(source);
        Ok(())
    }

    /// Stops the detection loop, pauses and rewinds the video, and removes
    /// its overlay. Idempotent.
    pub fn stop_video_analysis(&mut self) {
        self.stop_session();
        if let Some(video) = &self.video_source {
            if let Ok(mut v) = video.lock() {
                v.stop();
            }
        }
        self.surfaces.release(Mode::Video.slot_id());
        self.status = Some("video analysis stopped".to_string());
    }

    // ── Camera mode ──────────────────────────────────────────────────

    /// Opens the camera at `index` as the camera-mode source.
    pub fn start_camera(&mut self, index: u32) -> Result<(), CaptureError> {
        let source = CameraSource::open(index)?;
        self.set_camera_source(Arc::new(Mutex::new(source)));
        Ok(())
    }

    pub fn set_camera_source(&mut self, source: Arc<Mutex<dyn FrameSource>>) {
        if self.mode != Mode::Camera {
            self.switch_mode(Mode::Camera);
        }
        self.release_camera();
        self.camera_source = Some(source);
    }

    /// Stops realtime detection, releases the camera stream and removes its
    /// overlay. Idempotent.
    pub fn stop_camera(&mut self) {
        self.stop_session();
        self.release_camera();
        self.surfaces.release(Mode::Camera.slot_id());
        self.status = Some("camera stopped".to_string());
    }

    /// Toggles the repeating camera detection loop.
    pub fn set_realtime(&mut self, enabled: bool) -> Result<(), AnalyzeError> {
        if !enabled {
            self.stop_session();
            return Ok(());
        }
        let source = self
            .camera_source
            .clone()
            .ok_or(AnalyzeError::NoSource(Mode::Camera))?;
        self.start_session(source);
        Ok(())
    }

    // ── One-shot analysis ────────────────────────────────────────────

    /// Captures one frame from the active mode's source, submits it, and
    /// renders the result. Returns the number of faces found.
    pub fn analyze_once(&mut self) -> Result<usize, AnalyzeError> {
        if self.session.as_ref().is_some_and(|s| s.is_busy()) {
            return Err(AnalyzeError::Busy);
        }
        let source = self
            .active_source()
            .ok_or(AnalyzeError::NoSource(self.mode))?;

        let frame = {
            let mut source = source.lock().map_err(|_| {
                AnalyzeError::Capture(CaptureError::Camera("source lock poisoned".to_string()))
            })?;
            if source.native_size().is_none() {
                return Err(AnalyzeError::Capture(CaptureError::NotReady));
            }
            source.grab()?
        };

        let jpeg = encode_jpeg(&frame, self.config.snapshot_jpeg_quality)?;
        let mut detector = (self.detector_factory)();
        let faces = match detector.detect(&jpeg) {
            Ok(faces) => faces,
            Err(DetectionError::MalformedResponse(message)) => {
                log::warn!("malformed detection response treated as empty: {message}");
                Vec::new()
            }
            Err(e) => {
                self.status = Some(e.to_string());
                return Err(e.into());
            }
        };

        self.render_faces(&faces, frame.width(), frame.height());
        self.record_results(&faces);
        Ok(self.results.len())
    }

    // ── Event pump ───────────────────────────────────────────────────

    /// Drains pending session events, rendering those still current and
    /// discarding stale ones. Returns how many events were handled.
    pub fn pump_events(&mut self) -> usize {
        let Some(rx) = self.session_rx.clone() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.apply_event(event);
            handled += 1;
        }
        handled
    }

    fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Detections {
                faces,
                source_width,
                source_height,
                generation,
            } => {
                // Staleness check: a result from a torn-down binding must
                // produce no draw call.
                if generation != self.generation {
                    log::debug!("discarding stale detection result (generation {generation})");
                    return;
                }
                self.render_faces(&faces, source_width, source_height);
                self.record_results(&faces);
            }
            SessionEvent::SourceEnded { generation } => {
                if generation != self.generation {
                    return;
                }
                self.status = Some("source ended".to_string());
                self.stop_session();
            }
            SessionEvent::Status {
                message,
                generation,
            } => {
                if generation != self.generation {
                    return;
                }
                self.status = Some(message);
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn active_source(&self) -> Option<Arc<Mutex<dyn FrameSource>>> {
        match self.mode {
            Mode::Image => self.image_source.clone(),
            Mode::Video => self.video_source.clone(),
            Mode::Camera => self.camera_source.clone(),
        }
    }

    fn start_session(&mut self, source: Arc<Mutex<dyn FrameSource>>) {
        self.stop_session();
        self.generation += 1;
        let (session, rx) = PollSession::spawn(SessionParams {
            source,
            detector: (self.detector_factory)(),
            interval: self.config.interval,
            jpeg_quality: self.config.realtime_jpeg_quality,
            generation: self.generation,
        });
        self.session = Some(session);
        self.session_rx = Some(rx);
    }

    fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        self.session_rx = None;
    }

    fn release_camera(&mut self) {
        if let Some(camera) = self.camera_source.take() {
            if let Ok(mut c) = camera.lock() {
                c.stop();
            }
        }
    }

    fn render_faces(&mut self, faces: &[Face], source_width: u32, source_height: u32) {
        let (width, height) = self
            .config
            .display_size
            .unwrap_or((source_width, source_height));
        let surface = self.surfaces.acquire(self.mode.slot_id(), width, height);
        renderer::render(surface, faces, source_width, source_height);
    }

    fn record_results(&mut self, faces: &[Face]) {
        self.results = faces
            .iter()
            .map(|face| ResultEntry {
                emotion: face
                    .dominant_emotion()
                    .map(|(label, _)| label.to_string())
                    .or_else(|| face.emotion.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                confidence: face.dominant_emotion().map(|(_, c)| c).or(face.score),
            })
            .collect();
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.stop_session();
        self.release_camera();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face::FaceBox;
    use crate::shared::frame::Frame;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ── Stubs ────────────────────────────────────────────────────────

    struct StubSource {
        width: u32,
        height: u32,
        grabs: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    impl StubSource {
        fn new(width: u32, height: u32) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let grabs = Arc::new(AtomicUsize::new(0));
            let stopped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    width,
                    height,
                    grabs: grabs.clone(),
                    stopped: stopped.clone(),
                },
                grabs,
                stopped,
            )
        }
    }

    impl FrameSource for StubSource {
        fn native_size(&self) -> Option<(u32, u32)> {
            Some((self.width, self.height))
        }

        fn grab(&mut self) -> Result<Frame, CaptureError> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            Ok(Frame::new(
                vec![100; (self.width * self.height * 3) as usize],
                self.width,
                self.height,
            ))
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct StubDetector {
        faces: Vec<Face>,
    }

    impl EmotionDetector for StubDetector {
        fn detect(&mut self, _jpeg: &[u8]) -> Result<Vec<Face>, DetectionError> {
            Ok(self.faces.clone())
        }
    }

    fn happy_face() -> Face {
        Face {
            emotion: Some("happy".to_string()),
            score: Some(0.87),
            ..Face::new(FaceBox::new(10.0, 20.0, 100.0, 50.0))
        }
    }

    fn factory_returning(faces: Vec<Face>) -> DetectorFactory {
        Box::new(move || {
            Box::new(StubDetector {
                faces: faces.clone(),
            })
        })
    }

    fn controller_with(faces: Vec<Face>, config: ControllerConfig) -> ModeController {
        ModeController::new(factory_returning(faces), config)
    }

    fn fast_config() -> ControllerConfig {
        ControllerConfig {
            interval: Duration::from_millis(10),
            ..ControllerConfig::default()
        }
    }

    // ── Defaults and one-shot ────────────────────────────────────────

    #[test]
    fn test_entry_state_is_image_mode() {
        let controller = controller_with(vec![], ControllerConfig::default());
        assert_eq!(controller.mode(), Mode::Image);
        assert!(!controller.is_polling());
    }

    #[test]
    fn test_analyze_once_without_source_fails() {
        let mut controller = controller_with(vec![], ControllerConfig::default());
        assert!(matches!(
            controller.analyze_once(),
            Err(AnalyzeError::NoSource(Mode::Image))
        ));
    }

    #[test]
    fn test_analyze_once_renders_and_records() {
        let mut controller = controller_with(vec![happy_face()], ControllerConfig::default());
        let (source, grabs, _) = StubSource::new(320, 240);
        controller.set_image_source(Arc::new(Mutex::new(source)));

        let count = controller.analyze_once().unwrap();
        assert_eq!(count, 1);
        assert_eq!(grabs.load(Ordering::SeqCst), 1);

        let results = controller.results();
        assert_eq!(results[0].emotion, "happy");
        assert_eq!(results[0].confidence, Some(0.87));

        // Overlay rendered at native size.
        let surface = controller.surface(Mode::Image).unwrap();
        assert_eq!((surface.width(), surface.height()), (320, 240));
        assert!(!surface.is_clear());
    }

    #[test]
    fn test_end_to_end_double_resolution_surface() {
        // Source 320x240 displayed at 640x480: box [10,20,100,50] must land
        // at (20,40) with size (200,100), labeled "happy 87%".
        let config = ControllerConfig {
            display_size: Some((640, 480)),
            ..ControllerConfig::default()
        };
        let mut controller = controller_with(vec![happy_face()], config);
        let (source, _, _) = StubSource::new(320, 240);
        controller.set_image_source(Arc::new(Mutex::new(source)));

        controller.analyze_once().unwrap();

        let surface = controller.surface(Mode::Image).unwrap();
        let red = image::Rgba([0xFF, 0x52, 0x52, 0xFF]);
        assert_eq!(surface.pixel(20, 40), red);
        assert_eq!(surface.pixel(219, 139), red);
        assert_eq!(controller.results()[0].emotion, "happy");
        assert_eq!(happy_face().label(), "happy 87%");
    }

    // ── Mode switching and teardown ──────────────────────────────────

    #[test]
    fn test_switch_mode_clears_surfaces_and_results() {
        let mut controller = controller_with(vec![happy_face()], ControllerConfig::default());
        let (source, _, _) = StubSource::new(100, 100);
        controller.set_image_source(Arc::new(Mutex::new(source)));
        controller.analyze_once().unwrap();
        assert!(controller.surface(Mode::Image).is_some());
        assert!(!controller.results().is_empty());

        controller.switch_mode(Mode::Video);
        assert_eq!(controller.mode(), Mode::Video);
        assert!(controller.surface(Mode::Image).is_none());
        assert!(controller.results().is_empty());
        assert!(controller.status().is_none());
    }

    #[test]
    fn test_camera_to_image_switch_stops_timer_and_releases_camera() {
        let mut controller = controller_with(vec![happy_face()], fast_config());
        let (source, grabs, stopped) = StubSource::new(64, 64);
        controller.set_camera_source(Arc::new(Mutex::new(source)));
        controller.set_realtime(true).unwrap();
        assert!(controller.is_polling());

        std::thread::sleep(Duration::from_millis(60));
        assert!(grabs.load(Ordering::SeqCst) >= 1);

        controller.switch_mode(Mode::Image);
        assert!(!controller.is_polling());
        assert!(stopped.load(Ordering::SeqCst), "camera stream not released");

        // No further captures once the switch has completed.
        let after = grabs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(grabs.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_stop_camera_is_idempotent() {
        let mut controller = controller_with(vec![], fast_config());
        let (source, _, stopped) = StubSource::new(64, 64);
        controller.set_camera_source(Arc::new(Mutex::new(source)));
        controller.stop_camera();
        controller.stop_camera();
        assert!(stopped.load(Ordering::SeqCst));
        assert!(controller.surface(Mode::Camera).is_none());
    }

    #[test]
    fn test_replacing_camera_releases_previous_stream() {
        let mut controller = controller_with(vec![], fast_config());
        let (first, _, first_stopped) = StubSource::new(64, 64);
        controller.set_camera_source(Arc::new(Mutex::new(first)));
        let (second, _, _) = StubSource::new(64, 64);
        controller.set_camera_source(Arc::new(Mutex::new(second)));
        assert!(first_stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_set_realtime_false_stops_polling() {
        let mut controller = controller_with(vec![], fast_config());
        let (source, _, _) = StubSource::new(64, 64);
        controller.set_camera_source(Arc::new(Mutex::new(source)));
        controller.set_realtime(true).unwrap();
        assert!(controller.is_polling());
        controller.set_realtime(false).unwrap();
        assert!(!controller.is_polling());
    }

    #[test]
    fn test_realtime_without_camera_fails() {
        let mut controller = controller_with(vec![], fast_config());
        controller.switch_mode(Mode::Camera);
        assert!(matches!(
            controller.set_realtime(true),
            Err(AnalyzeError::NoSource(Mode::Camera))
        ));
    }

    // ── Event handling and staleness ─────────────────────────────────

    #[test]
    fn test_stale_detection_event_produces_no_draw() {
        let mut controller = controller_with(vec![], ControllerConfig::default());
        controller.switch_mode(Mode::Camera);

        let stale_generation = controller.generation + 5;
        controller.apply_event(SessionEvent::Detections {
            faces: vec![happy_face()],
            source_width: 100,
            source_height: 100,
            generation: stale_generation,
        });

        assert!(controller.surface(Mode::Camera).is_none());
        assert!(controller.results().is_empty());
    }

    #[test]
    fn test_current_detection_event_renders() {
        let mut controller = controller_with(vec![], ControllerConfig::default());
        controller.switch_mode(Mode::Camera);

        controller.apply_event(SessionEvent::Detections {
            faces: vec![happy_face()],
            source_width: 320,
            source_height: 240,
            generation: controller.generation,
        });

        assert!(controller.surface(Mode::Camera).is_some());
        assert_eq!(controller.results().len(), 1);
    }

    #[test]
    fn test_empty_detection_event_clears_overlay() {
        let mut controller = controller_with(vec![], ControllerConfig::default());
        controller.switch_mode(Mode::Camera);
        controller.apply_event(SessionEvent::Detections {
            faces: vec![happy_face()],
            source_width: 100,
            source_height: 100,
            generation: controller.generation,
        });
        assert!(!controller.surface(Mode::Camera).unwrap().is_clear());

        controller.apply_event(SessionEvent::Detections {
            faces: vec![],
            source_width: 100,
            source_height: 100,
            generation: controller.generation,
        });
        assert!(controller.surface(Mode::Camera).unwrap().is_clear());
        assert!(controller.results().is_empty());
    }

    #[test]
    fn test_source_ended_event_stops_session() {
        let mut controller = controller_with(vec![], fast_config());
        let (source, _, _) = StubSource::new(64, 64);
        controller.set_video_source(Arc::new(Mutex::new(source)));
        controller.start_video_analysis().unwrap();
        assert!(controller.is_polling());

        controller.apply_event(SessionEvent::SourceEnded {
            generation: controller.generation,
        });
        assert!(!controller.is_polling());
        assert_eq!(controller.status(), Some("source ended"));
    }

    #[test]
    fn test_status_event_surfaces_message() {
        let mut controller = controller_with(vec![], ControllerConfig::default());
        controller.apply_event(SessionEvent::Status {
            message: "detection service returned status 503".to_string(),
            generation: controller.generation,
        });
        assert_eq!(
            controller.status(),
            Some("detection service returned status 503")
        );
    }

    #[test]
    fn test_video_lifecycle_pump_renders_detections() {
        let mut controller = controller_with(vec![happy_face()], fast_config());
        let (source, grabs, _) = StubSource::new(64, 64);
        controller.set_video_source(Arc::new(Mutex::new(source)));
        controller.start_video_analysis().unwrap();

        // Wait for at least one tick, then pump.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut handled = 0;
        while handled == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            handled = controller.pump_events();
        }
        assert!(handled > 0);
        assert!(grabs.load(Ordering::SeqCst) >= 1);
        assert!(controller.surface(Mode::Video).is_some());

        controller.stop_video_analysis();
        assert!(!controller.is_polling());
        assert!(controller.surface(Mode::Video).is_none());
    }
}
