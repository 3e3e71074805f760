use crate::framing::domain::crop_geometry::CropRect;
use crate::shared::frame::Frame;

/// Domain interface for the crop + resize transform.
///
/// Produces a new frame of `output_size` holding the `rect` region of
/// `frame`. The input frame is left untouched.
pub trait FrameCropper: Send {
    fn crop_resize(
        &self,
        frame: &Frame,
        rect: &CropRect,
        output_size: (u32, u32),
    ) -> Result<Frame, Box<dyn std::error::Error>>;
}
