/// Axis-aligned face bounding box in source-frame pixel coordinates.
///
/// Coordinates are always relative to the pixel dimensions of the frame
/// that was submitted for detection, never to the display size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One detected face with its emotion classification.
///
/// `emotions` keeps the order entries arrived in on the wire; dominant
/// emotion selection relies on that order for deterministic tie-breaks.
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub bbox: FaceBox,
    pub emotion: Option<String>,
    pub score: Option<f32>,
    pub emotions: Vec<(String, f32)>,
}

impl Face {
    pub fn new(bbox: FaceBox) -> Self {
        Self {
            bbox,
            emotion: None,
            score: None,
            emotions: Vec::new(),
        }
    }

    /// Picks the highest-confidence entry from the emotion distribution.
    ///
    /// Strictly-greater comparison: the first entry seen wins ties, so the
    /// choice never depends on container iteration order.
    pub fn dominant_emotion(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, confidence) in &self.emotions {
            let replace = match best {
                Some((_, current)) => *confidence > current,
                None => true,
            };
            if replace {
                best = Some((label.as_str(), *confidence));
            }
        }
        best
    }

    /// Text for the label band: `"<emotion> <percent>%"`, degrading to the
    /// bare emotion name or a neutral placeholder when fields are missing.
    pub fn label(&self) -> String {
        if let Some((label, confidence)) = self.dominant_emotion() {
            return format!("{} {}%", label, percent(confidence));
        }
        match (&self.emotion, self.score) {
            (Some(emotion), Some(score)) => format!("{} {}%", emotion, percent(score)),
            (Some(emotion), None) => emotion.clone(),
            _ => "face".to_string(),
        }
    }
}

fn percent(confidence: f32) -> u32 {
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u32
}
