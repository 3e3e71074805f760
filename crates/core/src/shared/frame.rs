use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::ArrayView3;

/// Number of interleaved channels in every frame (RGB24).
pub const RGB_CHANNELS: u8 = 3;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Pixel format conversion happens in the capture source; everything past
/// it works on RGB24 only. `index` is the capture sequence number.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * RGB_CHANNELS as usize,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    /// Solid-color frame, mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let pixels = (width as usize) * (height as usize);
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::new(data, width, height, index)
    }

    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Borrowed `image` view over the pixel data, no copy.
    pub fn as_image(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// `[height, width, channel]` view used by the detection backends.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                RGB_CHANNELS as usize,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }

    /// RGBA copy for presentation layers that only accept 4-channel pixels.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() / 3 * 4);
        for px in self.data.chunks_exact(3) {
            out.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        out
    }

    /// BT.601 luma of one pixel in `[0, 255]`. Coordinates clamp to the frame.
    pub fn luma_at(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width.saturating_sub(1)) as usize;
        let y = y.min(self.height.saturating_sub(1)) as usize;
        let offset = (y * self.width as usize + x) * 3;
        let px = &self.data[offset..offset + 3];
        0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
    }
}
