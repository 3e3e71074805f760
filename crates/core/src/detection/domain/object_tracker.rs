use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// A live single-object tracker bound to one target.
pub trait ObjectTracker: Send {
    /// Advances the tracker to `frame` and returns its quality score.
    ///
    /// The score is opaque; callers only compare it against a threshold.
    fn update(&mut self, frame: &Frame) -> f64;

    /// Box of the target as of the last update (or the initial box).
    fn current_box(&self) -> BoundingBox;
}

/// Starts trackers on a frame/box pair. Re-initialization means starting a
/// fresh tracker and dropping the old one.
pub trait TrackerFactory: Send {
    fn start(
        &self,
        frame: &Frame,
        target: &BoundingBox,
    ) -> Result<Box<dyn ObjectTracker>, Box<dyn std::error::Error>>;
}
