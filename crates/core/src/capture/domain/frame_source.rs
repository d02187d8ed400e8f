use crate::capture::error::CaptureError;
use crate::shared::frame::Frame;

/// A media source the annotation pipeline can capture still frames from.
///
/// Implementations cover still images, playing video files and live
/// cameras; the poll loop treats them uniformly.
pub trait FrameSource: Send {
    /// Native pixel dimensions of the source, if known and non-zero.
    fn native_size(&self) -> Option<(u32, u32)>;

    /// Captures the source's current visual frame at native resolution.
    ///
    /// Returns [`CaptureError::NotReady`] while the source cannot produce a
    /// frame; the caller skips the tick. [`CaptureError::Ended`] signals a
    /// finite source that ran out.
    fn grab(&mut self) -> Result<Frame, CaptureError>;

    /// Starts time-based playback, for sources that have it. Default no-op.
    fn play(&mut self) {}

    /// Stops the source: pause-and-rewind for playback sources, stream
    /// release for device sources. Idempotent, never fails.
    fn stop(&mut self) {}
}
