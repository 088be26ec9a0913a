use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::object::DecodeError;

/// Canvas-level settings, replicated one key at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSettings {
    pub background_color: String,
    pub width: f64,
    pub height: f64,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".to_string(),
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl CanvasSettings {
    pub fn apply(&mut self, setting: &CanvasSetting) {
        match setting {
            CanvasSetting::BackgroundColor(c) => self.background_color = c.clone(),
            CanvasSetting::Width(w) => self.width = *w,
            CanvasSetting::Height(h) => self.height = *h,
        }
    }
}

/// A single canvas setting change.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasSetting {
    BackgroundColor(String),
    Width(f64),
    Height(f64),
}

impl CanvasSetting {
    pub const BACKGROUND_COLOR: &'static str = "backgroundColor";
    pub const WIDTH: &'static str = "width";
    pub const HEIGHT: &'static str = "height";

    /// Key in the shared settings map.
    pub fn key(&self) -> &'static str {
        match self {
            CanvasSetting::BackgroundColor(_) => Self::BACKGROUND_COLOR,
            CanvasSetting::Width(_) => Self::WIDTH,
            CanvasSetting::Height(_) => Self::HEIGHT,
        }
    }

    pub fn value_json(&self) -> Result<String, DecodeError> {
        let value = match self {
            CanvasSetting::BackgroundColor(c) => Value::String(c.clone()),
            CanvasSetting::Width(w) => serde_json::to_value(w)?,
            CanvasSetting::Height(h) => serde_json::to_value(h)?,
        };
        Ok(value.to_string())
    }

    pub fn decode(key: &str, json: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(json)?;
        match key {
            Self::BACKGROUND_COLOR => Ok(CanvasSetting::BackgroundColor(serde_json::from_value(value)?)),
            Self::WIDTH => Ok(CanvasSetting::Width(serde_json::from_value(value)?)),
            Self::HEIGHT => Ok(CanvasSetting::Height(serde_json::from_value(value)?)),
            other => Err(DecodeError::UnknownSetting(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_json_shape() {
        let bg = CanvasSetting::BackgroundColor("#101010".to_string());
        assert_eq!(bg.key(), "backgroundColor");
        assert_eq!(bg.value_json().unwrap(), "\"#101010\"");
        assert_eq!(CanvasSetting::decode(bg.key(), "\"#101010\"").unwrap(), bg);

        assert_eq!(CanvasSetting::decode("width", "800").unwrap(), CanvasSetting::Width(800.0));
    }

    #[test]
    fn test_unknown_and_malformed_settings() {
        assert_eq!(
            CanvasSetting::decode("gridSize", "8"),
            Err(DecodeError::UnknownSetting("gridSize".to_string()))
        );
        assert!(matches!(
            CanvasSetting::decode("height", "\"tall\""),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_apply_updates_one_field() {
        let mut settings = CanvasSettings::default();
        settings.apply(&CanvasSetting::Height(600.0));
        assert_eq!(settings.height, 600.0);
        assert_eq!(settings.width, 1920.0);
        assert_eq!(settings.background_color, "#ffffff");
    }
}
