/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Letterbox preprocessing, inference, confidence filter and greedy NMS.
/// Boxes come back clamped to the frame, ordered top-to-bottom then
/// left-to-right so "first face" is stable between searches.
use std::path::Path;

use ndarray::{ArrayView2, Axis, Ix3};

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f64 = 0.4;

const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO padding colour, 114/255 gray.
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloLocator {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloLocator {
    /// Loads a YOLO face model. The square input size is read from the
    /// model's NCHW input shape, falling back to 640 when it is dynamic.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(accelerators())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!("YOLO locator input size {input_size}, confidence {confidence}");

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

/// Platform accelerator for inference; ONNX Runtime falls back to CPU when it
/// cannot be registered.
fn accelerators() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        log::debug!("Requesting CoreML execution provider");
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        log::debug!("Requesting DirectML execution provider");
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

impl FaceLocator for OnnxYoloLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::new(frame.width(), frame.height(), self.input_size);
        let input_value = ort::value::Tensor::from_array(letterbox.tensor(frame))?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }

        let tensor = outputs[0].try_extract_array::<f32>()?;
        let batch = tensor
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| format!("unexpected YOLO output shape: {:?}", tensor.shape()))?;
        let preds = batch.index_axis(Axis(0), 0);
        // Either [features, detections] or [detections, features].
        let preds = if preds.nrows() < preds.ncols() {
            preds.reversed_axes()
        } else {
            preds
        };

        let mut detections = decode_predictions(preds, self.confidence, &letterbox);
        let kept = nms(&mut detections, NMS_IOU_THRESH);
        Ok(finalize_boxes(kept, frame.width(), frame.height()))
    }
}

// ── Preprocessing ──

/// Geometry of a letterbox resize into a square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    target: u32,
    scale: f64,
    new_w: u32,
    new_h: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn new(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f64 / width as f64).min(target as f64 / height as f64);
        let new_w = ((width as f64 * scale).round() as u32).min(target);
        let new_h = ((height as f64 * scale).round() as u32).min(target);
        Self {
            target,
            scale,
            new_w,
            new_h,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
        }
    }

    /// Nearest-neighbour resize into a gray-padded NCHW float tensor.
    fn tensor(&self, frame: &Frame) -> ndarray::Array4<f32> {
        let size = self.target as usize;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);
        let src = frame.as_ndarray();
        let (src_h, src_w) = (frame.height() as usize, frame.width() as usize);

        for y in 0..self.new_h as usize {
            let sy = ((y as f64 / self.scale) as usize).min(src_h - 1);
            let ty = self.pad_y as usize + y;
            for x in 0..self.new_w as usize {
                let sx = ((x as f64 / self.scale) as usize).min(src_w - 1);
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[sy, sx, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps a model-space `(cx, cy, w, h)` box back to frame pixels.
    fn to_frame(&self, cx: f64, cy: f64, w: f64, h: f64) -> BoundingBox {
        let (px, py) = (self.pad_x as f64, self.pad_y as f64);
        BoundingBox::new(
            (cx - w / 2.0 - px) / self.scale,
            (cy - h / 2.0 - py) / self.scale,
            (cx + w / 2.0 - px) / self.scale,
            (cy + h / 2.0 - py) / self.scale,
        )
    }
}

// ── Postprocessing ──

#[derive(Clone, Debug)]
struct RawDetection {
    bbox: BoundingBox,
    confidence: f64,
}

/// Reads `[cx, cy, w, h, conf, ...]` rows, dropping low-confidence ones.
/// Trailing keypoint columns are ignored.
fn decode_predictions(
    preds: ArrayView2<f32>,
    confidence: f64,
    letterbox: &Letterbox,
) -> Vec<RawDetection> {
    if preds.ncols() < 5 {
        return Vec::new();
    }
    preds
        .rows()
        .into_iter()
        .filter_map(|row| {
            let conf = row[4] as f64;
            (conf >= confidence).then(|| RawDetection {
                bbox: letterbox.to_frame(row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64),
                confidence: conf,
            })
        })
        .collect()
}

/// Greedy NMS: highest confidence first, suppress boxes overlapping a kept one.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep.iter().all(|k| k.bbox.iou(&det.bbox) <= iou_thresh) {
            keep.push(det.clone());
        }
    }
    keep
}

/// Clamps to the frame, drops boxes that collapse, and orders the rest
/// top-to-bottom then left-to-right.
fn finalize_boxes(dets: Vec<RawDetection>, width: u32, height: u32) -> Vec<BoundingBox> {
    let mut boxes: Vec<BoundingBox> = dets
        .into_iter()
        .map(|d| d.bbox.clamp_to(width, height))
        .filter(BoundingBox::is_valid)
        .collect();
    boxes.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));
    boxes
}
