//! Real-time face/emotion annotation pipeline.
//!
//! Frames are captured from a media source (still image, video file or live
//! camera), submitted to an external detection service over HTTP, and the
//! results rendered as scaled overlays on a drawing surface bound to that
//! source.

pub mod capture;
pub mod detection;
pub mod overlay;
pub mod pipeline;
pub mod shared;
