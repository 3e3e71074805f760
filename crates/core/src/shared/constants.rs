pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;

/// Frames a tracker is trusted before a forced re-detection.
pub const DEFAULT_LIFETIME: u32 = 100;

/// Frames to wait after a failed search before searching again (~1 s at 30 fps).
pub const DEFAULT_DOWNTIME_THRESHOLD: u32 = 30;

/// Tracker updates scoring at or below this are treated as lost.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;

pub const DEFAULT_TRIM_VERTICAL: f64 = 0.35;
pub const DEFAULT_TRIM_HORIZONTAL: f64 = 0.5;
pub const DEFAULT_TRIM_ZOOM: f64 = 0.5;
pub const DEFAULT_PAN_SPEED: f64 = 1.0;
pub const DEFAULT_ZOOM_SPEED: f64 = 1.0;

/// Step applied to a trim ratio per key press.
pub const TRIM_STEP: f64 = 0.1;

/// Center goal only moves when the new candidate is farther than this (px).
pub const CENTER_JITTER_PX: f64 = 30.0;

/// Zoom goal only moves when the new candidate differs by more than this.
pub const ZOOM_JITTER: f64 = 0.5;

/// Each frame the current value moves by `gap / SMOOTHING_DIVISOR`.
pub const SMOOTHING_DIVISOR: f64 = 10.0;

/// Lower bound for the applied zoom scale; keeps the crop well defined.
pub const MIN_ZOOM_SCALE: f64 = 0.1;

/// Consecutive failed reads tolerated before capture is considered lost.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 30;
