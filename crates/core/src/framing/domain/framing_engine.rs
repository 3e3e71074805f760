use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{CENTER_JITTER_PX, MIN_ZOOM_SCALE, SMOOTHING_DIVISOR, ZOOM_JITTER};
use crate::shared::framing_config::FramingParams;

/// Integer pixel position.
pub type Point = (i64, i64);

/// Desired pan/zoom target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramingGoal {
    pub center: Point,
    pub zoom: f64,
}

/// Pan/zoom actually applied this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramingCurrent {
    pub center: Point,
    pub zoom_scale: f64,
}

/// Where the framing center and zoom would go for `face`, before hysteresis.
///
/// Coordinates truncate toward zero like the integer pixel grid they index.
pub fn candidate_goal(face: &BoundingBox, frame_height: u32, params: &FramingParams) -> FramingGoal {
    let cx = face.left + face.width() * params.trim_horizontal;
    let cy = face.top + face.height() * params.trim_vertical;
    FramingGoal {
        center: (cx as i64, cy as i64),
        zoom: frame_height as f64 / face.height() * params.trim_zoom,
    }
}

pub fn euclidean_distance(a: Point, b: Point) -> f64 {
    let dx = (a.0 - b.0) as f64;
    let dy = (a.1 - b.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Two first-order low-pass filters (center, zoom) chasing a goal that only
/// moves when a face box disagrees with it by more than the jitter margins.
#[derive(Clone, Debug, PartialEq)]
pub struct FramingEngine {
    frame_size: (u32, u32),
    goal: FramingGoal,
    current: FramingCurrent,
}

impl FramingEngine {
    /// Centered, unzoomed framing for a `width` x `height` frame.
    pub fn new(width: u32, height: u32) -> Self {
        let center = ((width / 2) as i64, (height / 2) as i64);
        Self {
            frame_size: (width, height),
            goal: FramingGoal { center, zoom: 1.0 },
            current: FramingCurrent {
                center,
                zoom_scale: 1.0,
            },
        }
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn goal(&self) -> FramingGoal {
        self.goal
    }

    pub fn current(&self) -> FramingCurrent {
        self.current
    }

    /// Moves the goal toward `face`, ignoring candidates within the jitter
    /// margins. Returns true if either component changed.
    pub fn update_goal(&mut self, face: &BoundingBox, frame_height: u32, params: &FramingParams) -> bool {
        if !face.is_valid() {
            return false;
        }
        let candidate = candidate_goal(face, frame_height, params);
        let mut changed = false;

        if euclidean_distance(candidate.center, self.goal.center) > CENTER_JITTER_PX {
            self.goal.center = candidate.center;
            changed = true;
        }
        if candidate.zoom.is_finite() && (candidate.zoom - self.goal.zoom).abs() > ZOOM_JITTER {
            self.goal.zoom = candidate.zoom;
            changed = true;
        }
        changed
    }

    /// One smoothing step toward the goal; runs every frame, face or not.
    ///
    /// Center moves by a truncated tenth of the remaining gap per axis, so it
    /// settles within a few pixels of the goal and never overshoots at speed 1.
    pub fn smooth(&mut self, params: &FramingParams) -> FramingCurrent {
        let (gx, gy) = self.goal.center;
        let (cx, cy) = self.current.center;
        self.current.center = (
            cx + pan_step(gx - cx, params.pan_speed),
            cy + pan_step(gy - cy, params.pan_speed),
        );

        let zoom = self.current.zoom_scale
            + (self.goal.zoom - self.current.zoom_scale) / SMOOTHING_DIVISOR * params.zoom_speed;
        self.current.zoom_scale = if zoom.is_finite() {
            zoom.max(MIN_ZOOM_SCALE)
        } else {
            MIN_ZOOM_SCALE
        };
        self.current
    }
}

fn pan_step(gap: i64, speed: f64) -> i64 {
    let step = (gap as f64 / SMOOTHING_DIVISOR).trunc();
    (step * speed) as i64
}
