use crate::detection::domain::face::Face;
use crate::detection::error::DetectionError;

/// Boundary to the external emotion detection service.
///
/// Implementations may keep connection or session state, hence `&mut self`.
pub trait EmotionDetector: Send {
    /// Submits one encoded frame and returns the normalized face list.
    ///
    /// An empty vec means the service saw no faces; response-shape problems
    /// surface as [`DetectionError::MalformedResponse`].
    fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<Face>, DetectionError>;
}
