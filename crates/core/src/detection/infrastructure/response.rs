use serde::de::{MapAccess, Visitor};
use serde::Deserialize;

use crate::detection::domain::face::{Face, FaceBox};
use crate::detection::error::DetectionError;

/// Parses a `/detect` response body into normalized faces.
///
/// Shape-sniffing happens here and nowhere else: the renderer only ever
/// sees clean [`Face`] records. A missing `results` or `faces` key means
/// zero detections; individual face entries with unrecognized shapes are
/// dropped; only a body that is not valid JSON at all is an error.
pub fn parse_detect_response(body: &str) -> Result<Vec<Face>, DetectionError> {
    let response: DetectResponse =
        serde_json::from_str(body).map_err(|e| DetectionError::MalformedResponse(e.to_string()))?;

    // Live modes submit one frame per request, so only the first result
    // entry is meaningful.
    Ok(response
        .results
        .into_iter()
        .next()
        .map(|entry| entry.faces.into_iter().filter_map(normalize_face).collect())
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    results: Vec<ResultEntry>,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    #[serde(default)]
    faces: Vec<serde_json::Value>,
}

/// The face shapes the service (and older builds of it) are known to emit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFace {
    Boxed {
        #[serde(rename = "box")]
        bbox: [f32; 4],
        emotion: Option<String>,
        score: Option<f32>,
        emotions: Option<EmotionScores>,
    },
    Flat {
        x: f32,
        y: f32,
        #[serde(default)]
        width: f32,
        #[serde(default)]
        height: f32,
        emotion: Option<String>,
        score: Option<f32>,
        emotions: Option<EmotionScores>,
    },
    Bare([f32; 4]),
}

fn normalize_face(value: serde_json::Value) -> Option<Face> {
    let raw: RawFace = serde_json::from_value(value).ok()?;
    let face = match raw {
        RawFace::Boxed {
            bbox,
            emotion,
            score,
            emotions,
        } => Face {
            bbox: FaceBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
            emotion,
            score,
            emotions: emotions.map(|s| s.0).unwrap_or_default(),
        },
        RawFace::Flat {
            x,
            y,
            width,
            height,
            emotion,
            score,
            emotions,
        } => Face {
            bbox: FaceBox::new(x, y, width, height),
            emotion,
            score,
            emotions: emotions.map(|s| s.0).unwrap_or_default(),
        },
        RawFace::Bare(bbox) => Face::new(FaceBox::new(bbox[0], bbox[1], bbox[2], bbox[3])),
    };
    Some(face)
}

/// Emotion label → confidence pairs in wire order.
///
/// Deserialized with an explicit map visitor so entry order survives; the
/// dominant-emotion tie-break depends on it.
#[derive(Debug, Default)]
struct EmotionScores(Vec<(String, f32)>);

impl<'de> Deserialize<'de> for EmotionScores {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = EmotionScores;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of emotion labels to confidences")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((label, confidence)) = map.next_entry::<String, f32>()? {
                    entries.push((label, confidence));
                }
                Ok(EmotionScores(entries))
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}
