use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;

use crate::capture::error::CaptureError;
use crate::shared::frame::Frame;

/// Encodes a frame as lossy JPEG at the given quality factor.
///
/// The encode buffer is sized to the frame's native resolution and only the
/// compressed bytes survive; nothing here depends on the display size.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .write_image(
            frame.data(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(CaptureError::Encode)?;
    Ok(out)
}
