/// Detection service base URL used until the user configures one.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000";

/// Period of the realtime detection timer.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// JPEG quality factor for frames captured on a realtime tick.
pub const REALTIME_JPEG_QUALITY: u8 = 70;

/// JPEG quality factor for one-shot captures.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 80;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm"];
