use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::error::CaptureError;
use crate::shared::frame::Frame;

/// Live camera frames via nokhwa.
///
/// The stream is opened eagerly; `stop` releases it and is safe to call
/// more than once. Dropping the source also releases the device.
pub struct CameraSource {
    camera: Camera,
    streaming: bool,
}

impl CameraSource {
    /// Opens the camera at `index` and starts its stream.
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| CaptureError::Camera(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::Camera(e.to_string()))?;
        log::info!(
            "opened camera {index}: {} ({})",
            camera.info().human_name(),
            camera.camera_format()
        );
        Ok(Self {
            camera,
            streaming: true,
        })
    }

    pub fn name(&self) -> String {
        self.camera.info().human_name()
    }
}

impl FrameSource for CameraSource {
    fn native_size(&self) -> Option<(u32, u32)> {
        if !self.streaming {
            return None;
        }
        let resolution = self.camera.resolution();
        if resolution.width() == 0 || resolution.height() == 0 {
            None
        } else {
            Some((resolution.width(), resolution.height()))
        }
    }

    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if !self.streaming {
            return Err(CaptureError::NotReady);
        }
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CaptureError::Camera(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Camera(e.to_string()))?;
        Ok(Frame::from_rgb_image(decoded))
    }

    fn stop(&mut self) {
        if self.streaming {
            if let Err(e) = self.camera.stop_stream() {
                log::warn!("failed to stop camera stream: {e}");
            }
            self.streaming = false;
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}
