use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use emotionlens_core::shared::constants::DEFAULT_ENDPOINT;

/// Persisted user configuration: the detection service base endpoint.
///
/// Read at startup, written when the user changes it; absence or a corrupt
/// file silently falls back to the loopback default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("EmotionLens").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Ok(json) = serde_json::to_string_pretty(self) {
                let _ = fs::write(path, json);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_is_loopback() {
        let settings = Settings::default();
        assert_eq!(settings.endpoint, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_serde_round_trip() {
        let settings = Settings {
            endpoint: "http://10.0.0.5:9000".to_string(),
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.endpoint, settings.endpoint);
    }

    #[test]
    fn test_missing_field_falls_back_to_default() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_corrupt_json_is_not_an_error_on_load() {
        // load() goes through the same fallback path as a missing file;
        // parsing failures never propagate.
        let parsed: Option<Settings> = serde_json::from_str("{broken").ok();
        assert!(parsed.is_none());
        assert_eq!(Settings::default().endpoint, DEFAULT_ENDPOINT);
    }
}
