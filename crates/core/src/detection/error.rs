use thiserror::Error;

/// Failures at the detection service boundary.
///
/// None of these are fatal to the pipeline: the poll loop logs them and
/// continues, degrading to "no annotations this tick".
#[derive(Error, Debug)]
pub enum DetectionError {
    /// The service answered with a non-success HTTP status.
    #[error("detection service returned status {status}")]
    Service { status: u16 },

    /// The request never completed (connect, timeout, I/O).
    #[error("detection request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The body was not a recognizable detection response. Callers treat
    /// this as zero detections, not as a failure.
    #[error("unexpected detection response shape: {0}")]
    MalformedResponse(String),
}
