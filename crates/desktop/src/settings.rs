use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use autoframe_core::detection::infrastructure::onnx_yolo_locator::DEFAULT_CONFIDENCE;
use autoframe_core::shared::constants::{
    DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH,
    DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
use autoframe_core::shared::framing_config::FramingParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Camera index or backend device name.
    pub device: String,
    /// Replay a recorded video instead of opening the camera.
    pub input: Option<PathBuf>,
    pub realtime_replay: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Skips model resolution when set.
    pub model_path: Option<PathBuf>,
    pub confidence: f64,
    pub lifetime: u32,
    pub downtime_threshold: u32,
    pub quality_threshold: f64,
    pub trim_vertical: f64,
    pub trim_horizontal: f64,
    pub trim_zoom: f64,
    pub pan_speed: f64,
    pub zoom_speed: f64,
    pub max_consecutive_failures: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let framing = FramingParams::default();
        Self {
            device: "0".to_string(),
            input: None,
            realtime_replay: true,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            model_path: None,
            confidence: DEFAULT_CONFIDENCE,
            lifetime: framing.lifetime,
            downtime_threshold: framing.downtime_threshold,
            quality_threshold: framing.quality_threshold,
            trim_vertical: framing.trim_vertical,
            trim_horizontal: framing.trim_horizontal,
            trim_zoom: framing.trim_zoom,
            pan_speed: framing.pan_speed,
            zoom_speed: framing.zoom_speed,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("AutoFrame").join("settings.json"))
    }

    /// Loads settings from `explicit`, or from the user config directory.
    ///
    /// An explicit path must exist. A missing file in the config directory
    /// means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "capture size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(invalid("fps must be positive"));
        }
        if self.input.is_none() && self.device.trim().is_empty() {
            return Err(invalid("device must not be empty"));
        }
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(invalid(format!(
                "confidence must be in (0, 1], got {}",
                self.confidence
            )));
        }
        for (name, value) in [
            ("trim_vertical", self.trim_vertical),
            ("trim_horizontal", self.trim_horizontal),
            ("trim_zoom", self.trim_zoom),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        for (name, value) in [("pan_speed", self.pan_speed), ("zoom_speed", self.zoom_speed)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.quality_threshold.is_finite() {
            return Err(invalid("quality_threshold must be finite"));
        }
        Ok(())
    }

    pub fn framing_params(&self) -> FramingParams {
        FramingParams {
            trim_vertical: self.trim_vertical,
            trim_horizontal: self.trim_horizontal,
            trim_zoom: self.trim_zoom,
            pan_speed: self.pan_speed,
            zoom_speed: self.zoom_speed,
            lifetime: self.lifetime,
            downtime_threshold: self.downtime_threshold,
            quality_threshold: self.quality_threshold,
        }
    }
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.device, "0");
        assert_eq!((settings.width, settings.height, settings.fps), (1280, 720, 30));
        assert_eq!(settings.framing_params(), FramingParams::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, r#"{ "trim_zoom": 0.8, "device": "/dev/video2" }"#);

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.trim_zoom, 0.8);
        assert_eq!(settings.device, "/dev/video2");
        assert_eq!(settings.lifetime, 100);
        assert_eq!(settings.trim_vertical, 0.35);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "{ trim_zoom: ");
        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.input = Some(PathBuf::from("clip.mp4"));
        settings.pan_speed = 2.0;
        let path = write_settings(&dir, &serde_json::to_string_pretty(&settings).unwrap());
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[rstest]
    #[case::zero_width(|s: &mut Settings| s.width = 0)]
    #[case::zero_fps(|s: &mut Settings| s.fps = 0)]
    #[case::blank_device(|s: &mut Settings| s.device = " ".into())]
    #[case::zero_confidence(|s: &mut Settings| s.confidence = 0.0)]
    #[case::trim_above_one(|s: &mut Settings| s.trim_horizontal = 1.2)]
    #[case::negative_trim(|s: &mut Settings| s.trim_vertical = -0.1)]
    #[case::zero_pan_speed(|s: &mut Settings| s.pan_speed = 0.0)]
    #[case::nan_zoom_speed(|s: &mut Settings| s.zoom_speed = f64::NAN)]
    #[case::infinite_quality(|s: &mut Settings| s.quality_threshold = f64::INFINITY)]
    fn test_validate_rejects(#[case] tweak: fn(&mut Settings)) {
        let mut settings = Settings::default();
        tweak(&mut settings);
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_blank_device_is_fine_when_replaying_a_file() {
        let settings = Settings {
            device: String::new(),
            input: Some(PathBuf::from("clip.mp4")),
            ..Settings::default()
        };
        settings.validate().unwrap();
    }

    #[test]
    fn test_trim_bounds_are_inclusive() {
        let settings = Settings {
            trim_zoom: 0.0,
            trim_vertical: 1.0,
            ..Settings::default()
        };
        settings.validate().unwrap();
    }
}
