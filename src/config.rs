//! Detector settings
//!
//! Settings are optional. Without a settings file the detector runs with the
//! defaults below; a JSON file in the user's config directory can override
//! any subset of them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::ml::YoloParams;

/// Minimum confidence for a detection to be drawn and listed
pub const DISPLAY_CUTOFF: f32 = 0.60;

/// Initial position of the confidence slider
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Delay between the end of one tick and the start of the next
pub const DEFAULT_TICK_DELAY_MS: u64 = 10;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// ONNX model, absolute or relative to the executable / working directory
    pub model_path: PathBuf,
    /// Optional JSON labels file overriding the names stored in the model
    pub labels_path: Option<PathBuf>,
    /// Capture device index
    pub camera_index: u32,
    /// Initial inference threshold (0.0 - 1.0)
    pub confidence_threshold: f32,
    /// Delay between ticks in milliseconds (1 - 1000)
    pub tick_delay_ms: u64,
    /// Model input and post-processing parameters
    pub yolo: YoloParams,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/best.onnx"),
            labels_path: None,
            camera_index: 0,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            tick_delay_ms: DEFAULT_TICK_DELAY_MS,
            yolo: YoloParams::default(),
            window_width: 1200,
            window_height: 800,
        }
    }
}

impl DetectorSettings {
    /// Settings file location: `<config_dir>/asl-detector/settings.json`
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("asl-detector");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                log::warn!("Ignoring settings file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SettingsError> {
        let mut settings: Self = serde_json::from_str(contents)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Clamp values into their valid ranges
    pub fn sanitize(&mut self) {
        self.confidence_threshold = clamp_unit(self.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        self.tick_delay_ms = self.tick_delay_ms.clamp(1, 1000);
        self.yolo.input_size = self.yolo.input_size.clamp(32, 4096);
        self.yolo.iou_threshold = clamp_unit(self.yolo.iou_threshold, YoloParams::default().iou_threshold);
        self.yolo.max_detections = self.yolo.max_detections.max(1);
        self.window_width = self.window_width.max(1);
        self.window_height = self.window_height.max(1);
    }

    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.tick_delay_ms)
    }
}

/// Clamp into [0, 1]; NaN becomes `fallback`
pub fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DetectorSettings::default();
        assert_eq!(settings.model_path, PathBuf::from("model/best.onnx"));
        assert_eq!(settings.camera_index, 0);
        assert_eq!(settings.confidence_threshold, 0.25);
        assert_eq!(settings.tick_delay(), Duration::from_millis(10));
        assert_eq!((settings.window_width, settings.window_height), (1200, 800));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = DetectorSettings::from_json(r#"{ "camera_index": 2, "yolo": { "input_size": 320 } }"#)
            .unwrap();
        assert_eq!(settings.camera_index, 2);
        assert_eq!(settings.yolo.input_size, 320);
        assert_eq!(settings.yolo.iou_threshold, 0.7);
        assert_eq!(settings.confidence_threshold, 0.25);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let settings = DetectorSettings::from_json(
            r#"{ "confidence_threshold": 1.5, "tick_delay_ms": 0 }"#,
        )
        .unwrap();
        assert_eq!(settings.confidence_threshold, 1.0);
        assert_eq!(settings.tick_delay_ms, 1);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            DetectorSettings::from_json("not json"),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(f32::NAN, 0.3), 0.3);
        assert_eq!(clamp_unit(0.5, 0.3), 0.5);
        assert_eq!(clamp_unit(-1.0, 0.3), 0.0);
    }
}
