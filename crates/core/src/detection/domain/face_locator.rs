use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Domain interface for face localization.
///
/// Returns zero or more face boxes; the order is the locator's own and the
/// tracking state machine always picks the first one. May be slow and have
/// non-deterministic latency, hence `&mut self` so implementations can keep
/// scratch buffers between calls.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;
}
