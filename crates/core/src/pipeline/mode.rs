use serde::{Deserialize, Serialize};

/// Which media source currently owns the pipeline.
///
/// Exactly one mode is active at a time; `Image` is the entry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Image,
    Video,
    Camera,
}

impl Mode {
    pub const ALL: &[Mode] = &[Mode::Image, Mode::Video, Mode::Camera];

    /// Stable key for the mode's overlay slot.
    pub fn slot_id(self) -> &'static str {
        match self {
            Mode::Image => "image",
            Mode::Video => "video",
            Mode::Camera => "camera",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slot_id())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Mode::Image),
            "video" => Ok(Mode::Video),
            "camera" => Ok(Mode::Camera),
            other => Err(format!(
                "unknown mode '{other}' (expected image, video or camera)"
            )),
        }
    }
}
