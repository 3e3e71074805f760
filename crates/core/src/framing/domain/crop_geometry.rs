use crate::framing::domain::framing_engine::Point;

/// Crop rectangle in frame pixels, half-open: `[min_x, max_x) x [min_y, max_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: width,
            max_y: height,
        }
    }
}

/// Crop of size `frame / zoom_scale` centered on `center`, translated back
/// inside the frame when it would cross an edge.
///
/// The crop is never shrunk by clamping. Its size is bounded to
/// `[1, frame]` per axis, so a zoom below 1 (or a non-finite zoom) behaves
/// like no zoom. Returns `None` only for an empty frame.
pub fn compute_crop_rect(
    frame_width: u32,
    frame_height: u32,
    center: Point,
    zoom_scale: f64,
) -> Option<CropRect> {
    if frame_width == 0 || frame_height == 0 {
        return None;
    }
    let zoom = if zoom_scale.is_finite() && zoom_scale > 1.0 {
        zoom_scale
    } else {
        1.0
    };

    let (min_x, max_x) = place_span(frame_width, zoom, center.0);
    let (min_y, max_y) = place_span(frame_height, zoom, center.1);
    Some(CropRect {
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

/// Places a span of `extent / zoom` around `center` along one axis of
/// length `extent`.
fn place_span(extent: u32, zoom: f64, center: i64) -> (u32, u32) {
    let size = ((extent as f64 / zoom) as i64).clamp(1, extent as i64);
    let extent = extent as i64;

    let mut min = center - size / 2;
    let mut max = min + size;
    if min < 0 {
        max -= min;
        min = 0;
    } else if max > extent {
        min -= max - extent;
        max = extent;
    }
    (min as u32, max as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_unzoomed_crop_is_full_frame() {
        let rect = compute_crop_rect(1280, 720, (640, 360), 1.0).unwrap();
        assert_eq!(rect, CropRect::full(1280, 720));
    }

    #[test]
    fn test_centered_zoom() {
        let rect = compute_crop_rect(1280, 720, (640, 360), 2.0).unwrap();
        assert_eq!(
            rect,
            CropRect {
                min_x: 320,
                min_y: 180,
                max_x: 960,
                max_y: 540
            }
        );
    }

    #[test]
    fn test_top_left_overflow_translates_down_right() {
        let rect = compute_crop_rect(1280, 720, (10, 20), 2.0).unwrap();
        assert_eq!((rect.min_x, rect.min_y), (0, 0));
        assert_eq!((rect.width(), rect.height()), (640, 360));
    }

    #[test]
    fn test_bottom_right_overflow_translates_up_left() {
        let rect = compute_crop_rect(1280, 720, (1275, 715), 2.0).unwrap();
        assert_eq!((rect.max_x, rect.max_y), (1280, 720));
        assert_eq!((rect.width(), rect.height()), (640, 360));
    }

    #[test]
    fn test_reference_scenario_crop() {
        // center goal (600, 305) at zoom 1.2 -> 1066x600 crop
        let rect = compute_crop_rect(1280, 720, (600, 305), 1.2).unwrap();
        assert_eq!((rect.width(), rect.height()), (1066, 600));
        assert_eq!((rect.min_x, rect.min_y), (67, 5));
    }

    #[rstest]
    #[case::below_one(0.5)]
    #[case::zero(0.0)]
    #[case::negative(-3.0)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn test_degenerate_zoom_falls_back_to_full_frame(#[case] zoom: f64) {
        let rect = compute_crop_rect(1280, 720, (640, 360), zoom).unwrap();
        assert_eq!(rect, CropRect::full(1280, 720));
    }

    #[test]
    fn test_extreme_zoom_keeps_one_pixel() {
        let rect = compute_crop_rect(1280, 720, (5000, -5000), 1e9).unwrap();
        assert_eq!((rect.width(), rect.height()), (1, 1));
        assert_eq!((rect.max_x, rect.min_y), (1280, 0));
    }

    #[test]
    fn test_empty_frame_has_no_crop() {
        assert!(compute_crop_rect(0, 720, (0, 0), 1.0).is_none());
    }

    #[test]
    fn test_crop_always_inside_frame() {
        let sizes = [(1280u32, 720u32), (641, 479), (3, 2)];
        let centers = [-10_000i64, -1, 0, 1, 317, 640, 719, 1279, 1280, 99_999];
        let zooms = [1.0, 1.01, 1.2, 1.5, 2.0, 3.7, 10.0, 500.0];
        for &(w, h) in &sizes {
            for &cx in &centers {
                for &cy in &centers {
                    for &z in &zooms {
                        let r = compute_crop_rect(w, h, (cx, cy), z).unwrap();
                        assert!(r.min_x < r.max_x && r.max_x <= w, "{r:?} for {w}x{h}");
                        assert!(r.min_y < r.max_y && r.max_y <= h, "{r:?} for {w}x{h}");
                    }
                }
            }
        }
    }
}
