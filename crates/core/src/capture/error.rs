use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The source has no usable frame yet. Callers skip the current tick
    /// rather than treating this as a failure.
    #[error("source is not ready")]
    NotReady,

    /// A finite source (video file) ran out of frames.
    #[error("source has ended")]
    Ended,

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error("camera error: {0}")]
    Camera(String),
}
