use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::error::CaptureError;
use crate::capture::jpeg::encode_jpeg;
use crate::detection::domain::detector::EmotionDetector;
use crate::detection::domain::face::Face;
use crate::detection::error::DetectionError;
use crate::pipeline::events::SessionEvent;

pub struct SessionParams {
    pub source: Arc<Mutex<dyn FrameSource>>,
    pub detector: Box<dyn EmotionDetector>,
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub generation: u64,
}

/// A repeating capture→submit→render cycle on a fixed-period timer.
///
/// Ticks are strictly serialized: capture for tick N+1 never starts before
/// tick N has fully completed, and ticks that elapse while a request is
/// outstanding are coalesced, never queued (the single-flight guarantee).
/// Failures within a tick are logged and reported as transient status; they
/// never stop the session.
pub struct PollSession {
    stop_tx: Option<Sender<()>>,
    busy: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl PollSession {
    /// Starts the worker and returns the session handle plus its event
    /// stream.
    pub fn spawn(params: SessionParams) -> (Self, Receiver<SessionEvent>) {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            source: params.source,
            detector: params.detector,
            interval: params.interval,
            jpeg_quality: params.jpeg_quality,
            generation: params.generation,
            busy: busy.clone(),
            alive: alive.clone(),
            stop_rx,
            event_tx,
        };
        let handle = thread::spawn(move || worker.run());

        (
            Self {
                stop_tx: Some(stop_tx),
                busy,
                alive,
                handle: Some(handle),
                generation: params.generation,
            },
            event_rx,
        )
    }

    /// True while a detection request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stops the timer and joins the worker. Idempotent. A tick already in
    /// flight finishes, but the cleared liveness flag keeps its result from
    /// being published.
    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.stop_tx.take(); // disconnects the worker's stop receiver
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("poll session worker panicked");
            }
        }
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    source: Arc<Mutex<dyn FrameSource>>,
    detector: Box<dyn EmotionDetector>,
    interval: Duration,
    jpeg_quality: u8,
    generation: u64,
    busy: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
    event_tx: Sender<SessionEvent>,
}

enum TickOutcome {
    Detections {
        faces: Vec<Face>,
        width: u32,
        height: u32,
    },
    Skipped,
    Ended,
    Failed(String),
}

impl Worker {
    fn run(mut self) {
        let ticker = crossbeam_channel::tick(self.interval);
        loop {
            select! {
                recv(ticker) -> _ => {}
                // Fires on both an explicit stop and a dropped sender.
                recv(self.stop_rx) -> _ => break,
            }
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }

            // Single-flight: skip the tick if a request is outstanding.
            // The worker itself is serial, but one-shot analyzes share
            // this flag with the session.
            if self.busy.swap(true, Ordering::SeqCst) {
                continue;
            }
            let outcome = run_tick(&self.source, self.detector.as_mut(), self.jpeg_quality);
            self.busy.store(false, Ordering::SeqCst);

            // A result landing after teardown must not be published.
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }

            match outcome {
                TickOutcome::Detections {
                    faces,
                    width,
                    height,
                } => {
                    let _ = self.event_tx.send(SessionEvent::Detections {
                        faces,
                        source_width: width,
                        source_height: height,
                        generation: self.generation,
                    });
                }
                TickOutcome::Skipped => {}
                TickOutcome::Ended => {
                    let _ = self.event_tx.send(SessionEvent::SourceEnded {
                        generation: self.generation,
                    });
                    break;
                }
                TickOutcome::Failed(message) => {
                    log::warn!("detection tick failed: {message}");
                    let _ = self.event_tx.send(SessionEvent::Status {
                        message,
                        generation: self.generation,
                    });
                }
            }

            // Ticks that elapsed during a slow request coalesce into the
            // next period instead of firing back-to-back.
            while ticker.try_recv().is_ok() {}
        }
    }
}

fn run_tick(
    source: &Arc<Mutex<dyn FrameSource>>,
    detector: &mut dyn EmotionDetector,
    jpeg_quality: u8,
) -> TickOutcome {
    let frame = {
        let mut source = match source.lock() {
            Ok(guard) => guard,
            Err(_) => return TickOutcome::Failed("frame source lock poisoned".to_string()),
        };
        if source.native_size().is_none() {
            return TickOutcome::Skipped;
        }
        match source.grab() {
            Ok(frame) => frame,
            Err(CaptureError::NotReady) => return TickOutcome::Skipped,
            Err(CaptureError::Ended) => return TickOutcome::Ended,
            Err(e) => return TickOutcome::Failed(e.to_string()),
        }
    }; // lock released before the network round-trip

    let (width, height) = (frame.width(), frame.height());
    let jpeg = match encode_jpeg(&frame, jpeg_quality) {
        Ok(bytes) => bytes,
        Err(e) => return TickOutcome::Failed(e.to_string()),
    };

    match detector.detect(&jpeg) {
        Ok(faces) => TickOutcome::Detections {
            faces,
            width,
            height,
        },
        // Shape problems degrade to "no faces this tick", not a failure.
        Err(DetectionError::MalformedResponse(message)) => {
            log::warn!("malformed detection response treated as empty: {message}");
            TickOutcome::Detections {
                faces: Vec::new(),
                width,
                height,
            }
        }
        Err(e) => TickOutcome::Failed(e.to_string()),
    }
}
