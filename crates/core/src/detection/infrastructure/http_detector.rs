use std::time::Duration;

use reqwest::blocking::{multipart, Client};

use crate::detection::domain::detector::EmotionDetector;
use crate::detection::domain::face::Face;
use crate::detection::error::DetectionError;
use crate::detection::infrastructure::response::parse_detect_response;

/// Cap on one detect round-trip so a stalled service cannot wedge a tick
/// forever; the single-flight guard holds the session until this expires.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Talks to the emotion detection service over HTTP.
///
/// One request per captured frame: a multipart POST of the encoded image to
/// `<endpoint>/detect` with the fields the service expects (`file` and
/// `input_type`).
pub struct HttpDetector {
    client: Client,
    endpoint: String,
}

impl HttpDetector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: normalize_endpoint(endpoint.into()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn normalize_endpoint(endpoint: String) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

impl EmotionDetector for HttpDetector {
    fn detect(&mut self, jpeg: &[u8]) -> Result<Vec<Face>, DetectionError> {
        let part = multipart::Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("input_type", "image");

        let response = self
            .client
            .post(format!("{}/detect", self.endpoint))
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Service {
                status: status.as_u16(),
            });
        }

        let body = response.text()?;
        log::debug!("detect response: {} bytes", body.len());
        parse_detect_response(&body)
    }
}
