use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::shared::constants::{
    DEFAULT_DOWNTIME_THRESHOLD, DEFAULT_LIFETIME, DEFAULT_PAN_SPEED, DEFAULT_QUALITY_THRESHOLD,
    DEFAULT_TRIM_HORIZONTAL, DEFAULT_TRIM_VERTICAL, DEFAULT_TRIM_ZOOM, DEFAULT_ZOOM_SPEED,
};

/// `f64` stored as raw bits in an `AtomicU64`.
///
/// Every field is read and written independently; there is no multi-field
/// atomicity, so a reader may observe one field a frame late.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Applies `f` atomically and returns the new value.
    pub fn update(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return f64::from_bits(next),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Plain snapshot of [`FramingConfig`], taken once per pipeline iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramingParams {
    pub trim_vertical: f64,
    pub trim_horizontal: f64,
    pub trim_zoom: f64,
    pub pan_speed: f64,
    pub zoom_speed: f64,
    pub lifetime: u32,
    pub downtime_threshold: u32,
    pub quality_threshold: f64,
}

impl Default for FramingParams {
    fn default() -> Self {
        Self {
            trim_vertical: DEFAULT_TRIM_VERTICAL,
            trim_horizontal: DEFAULT_TRIM_HORIZONTAL,
            trim_zoom: DEFAULT_TRIM_ZOOM,
            pan_speed: DEFAULT_PAN_SPEED,
            zoom_speed: DEFAULT_ZOOM_SPEED,
            lifetime: DEFAULT_LIFETIME,
            downtime_threshold: DEFAULT_DOWNTIME_THRESHOLD,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}

/// Live framing parameters shared between the input loop (writer) and the
/// frame pipeline (reader).
///
/// Trim ratios are clamped to `[0, 1]` on every write.
#[derive(Debug)]
pub struct FramingConfig {
    trim_vertical: AtomicF64,
    trim_horizontal: AtomicF64,
    trim_zoom: AtomicF64,
    pan_speed: AtomicF64,
    zoom_speed: AtomicF64,
    lifetime: AtomicU32,
    downtime_threshold: AtomicU32,
    quality_threshold: AtomicF64,
}

impl FramingConfig {
    pub fn new(params: FramingParams) -> Self {
        Self {
            trim_vertical: AtomicF64::new(clamp_trim(params.trim_vertical)),
            trim_horizontal: AtomicF64::new(clamp_trim(params.trim_horizontal)),
            trim_zoom: AtomicF64::new(clamp_trim(params.trim_zoom)),
            pan_speed: AtomicF64::new(params.pan_speed),
            zoom_speed: AtomicF64::new(params.zoom_speed),
            lifetime: AtomicU32::new(params.lifetime),
            downtime_threshold: AtomicU32::new(params.downtime_threshold),
            quality_threshold: AtomicF64::new(params.quality_threshold),
        }
    }

    pub fn snapshot(&self) -> FramingParams {
        FramingParams {
            trim_vertical: self.trim_vertical.load(),
            trim_horizontal: self.trim_horizontal.load(),
            trim_zoom: self.trim_zoom.load(),
            pan_speed: self.pan_speed.load(),
            zoom_speed: self.zoom_speed.load(),
            lifetime: self.lifetime.load(Ordering::Relaxed),
            downtime_threshold: self.downtime_threshold.load(Ordering::Relaxed),
            quality_threshold: self.quality_threshold.load(),
        }
    }

    pub fn trim_vertical(&self) -> f64 {
        self.trim_vertical.load()
    }

    pub fn trim_horizontal(&self) -> f64 {
        self.trim_horizontal.load()
    }

    pub fn trim_zoom(&self) -> f64 {
        self.trim_zoom.load()
    }

    pub fn adjust_trim_vertical(&self, delta: f64) -> f64 {
        self.trim_vertical.update(|v| clamp_trim(v + delta))
    }

    pub fn adjust_trim_horizontal(&self, delta: f64) -> f64 {
        self.trim_horizontal.update(|v| clamp_trim(v + delta))
    }

    pub fn adjust_trim_zoom(&self, delta: f64) -> f64 {
        self.trim_zoom.update(|v| clamp_trim(v + delta))
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self::new(FramingParams::default())
    }
}

/// Clamps a trim ratio to `[0, 1]`, rounding away float drift from repeated
/// `0.1` steps so the bounds are reachable exactly.
fn clamp_trim(value: f64) -> f64 {
    let rounded = (value * 1e9).round() / 1e9;
    if rounded.is_nan() {
        return 0.0;
    }
    rounded.clamp(0.0, 1.0)
}
