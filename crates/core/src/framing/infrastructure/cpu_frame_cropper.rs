use image::imageops::{self, FilterType};

use crate::framing::domain::crop_geometry::CropRect;
use crate::framing::domain::frame_cropper::FrameCropper;
use crate::shared::frame::Frame;

/// Crop + resize on the CPU via the `image` crate.
///
/// Bilinear (`Triangle`) filtering by default, which matches what most
/// capture pipelines use for live rescaling.
pub struct CpuFrameCropper {
    filter: FilterType,
}

impl CpuFrameCropper {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for CpuFrameCropper {
    fn default() -> Self {
        Self::new(FilterType::Triangle)
    }
}

impl FrameCropper for CpuFrameCropper {
    fn crop_resize(
        &self,
        frame: &Frame,
        rect: &CropRect,
        output_size: (u32, u32),
    ) -> Result<Frame, Box<dyn std::error::Error>> {
        let (out_w, out_h) = output_size;
        if out_w == 0 || out_h == 0 {
            return Err("output size must be non-zero".into());
        }
        if rect.min_x >= rect.max_x
            || rect.min_y >= rect.max_y
            || rect.max_x > frame.width()
            || rect.max_y > frame.height()
        {
            return Err(format!(
                "crop {rect:?} does not fit a {}x{} frame",
                frame.width(),
                frame.height()
            )
            .into());
        }

        let unchanged = *rect == CropRect::full(frame.width(), frame.height())
            && output_size == (frame.width(), frame.height());
        if unchanged {
            return Ok(frame.clone());
        }

        let view = frame
            .as_image()
            .ok_or("frame buffer does not match its dimensions")?;
        let cropped =
            imageops::crop_imm(&view, rect.min_x, rect.min_y, rect.width(), rect.height()).to_image();
        let resized = if cropped.dimensions() == output_size {
            cropped
        } else {
            imageops::resize(&cropped, out_w, out_h, self.filter)
        };

        Ok(Frame::from_rgb_image(resized, frame.index()))
    }
}
