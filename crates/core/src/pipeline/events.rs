use crate::detection::domain::face::Face;

/// Messages a poll session worker sends back to its owner.
///
/// Every event carries the generation of the binding it belongs to; the
/// owner discards events whose generation is no longer current (the
/// staleness check for results that arrive after teardown).
#[derive(Debug)]
pub enum SessionEvent {
    /// A completed detection tick with the faces found in the frame.
    Detections {
        faces: Vec<Face>,
        source_width: u32,
        source_height: u32,
        generation: u64,
    },
    /// The source ran out of frames (a video reached its end).
    SourceEnded { generation: u64 },
    /// Transient user-visible status from a failed tick.
    Status { message: String, generation: u64 },
}
