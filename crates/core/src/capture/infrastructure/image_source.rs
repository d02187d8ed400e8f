use std::path::Path;

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::error::CaptureError;
use crate::shared::frame::Frame;

/// Adapts a still image file to the [`FrameSource`] interface.
///
/// The decoded image is held for the lifetime of the source; every grab
/// returns the same frame, so a poll loop over an image simply re-detects
/// the same content.
pub struct ImageSource {
    frame: Frame,
}

impl ImageSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let image = image::open(path)
            .map_err(|e| CaptureError::Decode(e.to_string()))?
            .to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::NotReady);
        }
        Ok(Self {
            frame: Frame::from_rgb_image(image),
        })
    }
}

impl FrameSource for ImageSource {
    fn native_size(&self) -> Option<(u32, u32)> {
        Some((self.frame.width(), self.frame.height()))
    }

    fn grab(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.frame.clone())
    }
}
