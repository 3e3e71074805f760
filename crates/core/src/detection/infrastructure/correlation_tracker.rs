//! Single-object correlation tracker.
//!
//! Keeps a small grayscale template of the tracked patch and, on every frame,
//! slides it over a search window around the previous position at a few
//! scales using normalized cross-correlation. The reported quality is the
//! peak-to-sidelobe ratio (PSR) of the winning response map.
//!
//! Template and window are high-pass filtered before matching. Shading and
//! lighting gradients then stop correlating at every offset, which keeps the
//! peak sharp on smooth, low-texture faces.

use ndarray::{s, Array2, ArrayView2, Zip};

use crate::detection::domain::object_tracker::{ObjectTracker, TrackerFactory};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationTrackerConfig {
    /// Longest template side, in cells.
    pub template_size: usize,
    /// Search radius around the previous position, in cells.
    pub search_radius: usize,
    pub scales: Vec<f64>,
    /// Multiplier applied to the peak of non-unit scales.
    pub scale_penalty: f64,
    pub learning_rate: f32,
    /// Template only adapts when the match is at least this good.
    pub min_update_psr: f64,
    /// Half-width of the window around the peak excluded from the sidelobe.
    pub peak_exclusion: usize,
}

impl Default for CorrelationTrackerConfig {
    fn default() -> Self {
        Self {
            template_size: 32,
            search_radius: 16,
            scales: vec![0.95, 1.0, 1.05],
            scale_penalty: 0.99,
            learning_rate: 0.1,
            min_update_psr: 7.0,
            peak_exclusion: 6,
        }
    }
}

/// Smallest box side (pixels) the tracker accepts.
const MIN_TARGET_SIDE: f64 = 4.0;

const MIN_TEMPLATE_SIDE: usize = 4;

/// Per-cell variance below which a patch counts as flat.
const FLAT_ENERGY_PER_CELL: f64 = 1e-4;

pub struct CorrelationTracker {
    config: CorrelationTrackerConfig,
    template: Array2<f32>,
    bbox: BoundingBox,
}

impl CorrelationTracker {
    pub fn start(
        config: CorrelationTrackerConfig,
        frame: &Frame,
        target: &BoundingBox,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err("cannot start tracking on an empty frame".into());
        }
        let bbox = target.clamp_to(frame.width(), frame.height());
        if !bbox.is_valid() || bbox.width() < MIN_TARGET_SIDE || bbox.height() < MIN_TARGET_SIDE {
            return Err(format!("target {target:?} is too small to track").into());
        }
        if config.scales.is_empty() || config.template_size < MIN_TEMPLATE_SIDE {
            return Err("tracker config needs at least one scale and a usable template".into());
        }

        let (cols, rows) = template_dims(config.template_size, &bbox);
        let cell = (bbox.width() / cols as f64, bbox.height() / rows as f64);
        let template = high_pass(&sample_gray(frame, (bbox.left, bbox.top), cell, cols, rows));

        Ok(Self {
            config,
            template,
            bbox,
        })
    }

    fn search_at_scale(&self, frame: &Frame, scale: f64) -> ScaleMatch {
        let (rows, cols) = self.template.dim();
        let r = self.config.search_radius;
        let (w, h) = (self.bbox.width() * scale, self.bbox.height() * scale);
        let cell = (w / cols as f64, h / rows as f64);
        let (cx, cy) = self.bbox.center();
        let origin = (
            cx - w / 2.0 - r as f64 * cell.0,
            cy - h / 2.0 - r as f64 * cell.1,
        );
        let window = high_pass(&sample_gray(frame, origin, cell, cols + 2 * r, rows + 2 * r));
        let response = response_map(&window, &self.template);

        let (peak_row, peak_col, peak) = argmax(&response);
        ScaleMatch {
            bbox: BoundingBox::from_center(
                cx + (peak_col as f64 - r as f64) * cell.0,
                cy + (peak_row as f64 - r as f64) * cell.1,
                w,
                h,
            ),
            patch: window
                .slice(s![peak_row..peak_row + rows, peak_col..peak_col + cols])
                .to_owned(),
            psr: psr(&response, (peak_row, peak_col), self.config.peak_exclusion),
            score: if scale == 1.0 {
                peak
            } else {
                peak * self.config.scale_penalty
            },
        }
    }

    /// Keeps the box center on the frame and its size usable.
    fn settle(&self, candidate: BoundingBox, frame: &Frame) -> BoundingBox {
        let (cx, cy) = candidate.center();
        let w = candidate.width().clamp(MIN_TARGET_SIDE, frame.width() as f64);
        let h = candidate.height().clamp(MIN_TARGET_SIDE, frame.height() as f64);
        BoundingBox::from_center(
            cx.clamp(0.0, frame.width() as f64),
            cy.clamp(0.0, frame.height() as f64),
            w,
            h,
        )
    }
}

struct ScaleMatch {
    bbox: BoundingBox,
    patch: Array2<f32>,
    psr: f64,
    score: f64,
}

impl ObjectTracker for CorrelationTracker {
    fn update(&mut self, frame: &Frame) -> f64 {
        if frame.is_empty() {
            return 0.0;
        }
        let best = self
            .config
            .scales
            .iter()
            .map(|&scale| self.search_at_scale(frame, scale))
            .max_by(|a, b| a.score.total_cmp(&b.score));
        let Some(best) = best else {
            return 0.0;
        };

        if best.psr >= self.config.min_update_psr {
            let lr = self.config.learning_rate;
            Zip::from(&mut self.template)
                .and(&best.patch)
                .for_each(|t, &p| *t = (1.0 - lr) * *t + lr * p);
        }
        self.bbox = self.settle(best.bbox, frame);
        best.psr
    }

    fn current_box(&self) -> BoundingBox {
        self.bbox
    }
}

/// Builds [`CorrelationTracker`]s with a shared configuration.
#[derive(Clone, Debug, Default)]
pub struct CorrelationTrackerFactory {
    config: CorrelationTrackerConfig,
}

impl CorrelationTrackerFactory {
    pub fn new(config: CorrelationTrackerConfig) -> Self {
        Self { config }
    }
}

impl TrackerFactory for CorrelationTrackerFactory {
    fn start(
        &self,
        frame: &Frame,
        target: &BoundingBox,
    ) -> Result<Box<dyn ObjectTracker>, Box<dyn std::error::Error>> {
        let tracker = CorrelationTracker::start(self.config.clone(), frame, target)?;
        Ok(Box::new(tracker))
    }
}

// ── Sampling and correlation ──

/// Template `(cols, rows)` preserving the box aspect ratio.
fn template_dims(size: usize, bbox: &BoundingBox) -> (usize, usize) {
    let aspect = bbox.height() / bbox.width();
    if aspect <= 1.0 {
        let rows = ((size as f64 * aspect).round() as usize).max(MIN_TEMPLATE_SIDE);
        (size, rows)
    } else {
        let cols = ((size as f64 / aspect).round() as usize).max(MIN_TEMPLATE_SIDE);
        (cols, size)
    }
}

/// Grayscale grid of `rows x cols` cells starting at `origin`, each cell the
/// mean of a 2x2 sub-sample. Out-of-frame samples repeat the edge pixel.
fn sample_gray(
    frame: &Frame,
    origin: (f64, f64),
    cell: (f64, f64),
    cols: usize,
    rows: usize,
) -> Array2<f32> {
    let at = |x: f64, y: f64| frame.luma_at(x.max(0.0) as u32, y.max(0.0) as u32);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let x0 = origin.0 + c as f64 * cell.0;
        let y0 = origin.1 + r as f64 * cell.1;
        let (x1, x2) = (x0 + cell.0 * 0.25, x0 + cell.0 * 0.75);
        let (y1, y2) = (y0 + cell.1 * 0.25, y0 + cell.1 * 0.75);
        (at(x1, y1) + at(x2, y1) + at(x1, y2) + at(x2, y2)) / 4.0
    })
}

/// Subtracts the 3x3 neighbourhood mean from every cell; the neighbourhood
/// shrinks at the borders.
fn high_pass(grid: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = grid.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let hood = grid.slice(s![
            r.saturating_sub(1)..(r + 2).min(rows),
            c.saturating_sub(1)..(c + 2).min(cols)
        ]);
        grid[[r, c]] - hood.sum() / hood.len() as f32
    })
}

/// NCC of `template` at every offset inside `window`.
fn response_map(window: &Array2<f32>, template: &Array2<f32>) -> Array2<f64> {
    let (rows, cols) = template.dim();
    let n = (rows * cols) as f64;
    let t_mean = template.iter().map(|&v| v as f64).sum::<f64>() / n;
    let centered = template.mapv(|v| v as f64 - t_mean);
    let t_energy = centered.iter().map(|v| v * v).sum::<f64>();

    let out_rows = window.nrows() - rows + 1;
    let out_cols = window.ncols() - cols + 1;
    Array2::from_shape_fn((out_rows, out_cols), |(dy, dx)| {
        let patch = window.slice(s![dy..dy + rows, dx..dx + cols]);
        ncc(patch, &centered, t_energy, n)
    })
}

fn ncc(patch: ArrayView2<f32>, centered: &Array2<f64>, t_energy: f64, n: f64) -> f64 {
    let (sum, sum_sq, cross) = Zip::from(&patch).and(centered).fold(
        (0.0f64, 0.0f64, 0.0f64),
        |(s, ss, x), &a, &t| {
            let a = a as f64;
            (s + a, ss + a * a, x + a * t)
        },
    );
    let p_energy = sum_sq - sum * sum / n;
    // Flat patches (rounding residue after the high-pass) carry no signal.
    if p_energy < FLAT_ENERGY_PER_CELL * n || t_energy < FLAT_ENERGY_PER_CELL * n {
        return 0.0;
    }
    cross / (p_energy * t_energy).sqrt()
}

fn argmax(map: &Array2<f64>) -> (usize, usize, f64) {
    map.indexed_iter()
        .fold((0, 0, f64::NEG_INFINITY), |best, ((r, c), &v)| {
            if v > best.2 {
                (r, c, v)
            } else {
                best
            }
        })
}

/// Peak-to-sidelobe ratio: how far the peak stands above the rest of the
/// response, in standard deviations of the rest.
fn psr(map: &Array2<f64>, peak: (usize, usize), exclusion: usize) -> f64 {
    let peak_value = map[[peak.0, peak.1]];
    let sidelobe: Vec<f64> = map
        .indexed_iter()
        .filter(|((r, c), _)| r.abs_diff(peak.0) > exclusion || c.abs_diff(peak.1) > exclusion)
        .map(|(_, &v)| v)
        .collect();
    if sidelobe.len() < 2 {
        return 0.0;
    }
    let mean = sidelobe.iter().sum::<f64>() / sidelobe.len() as f64;
    let var = sidelobe.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / sidelobe.len() as f64;
    let std = var.sqrt();
    if std < 1e-9 {
        0.0
    } else {
        (peak_value - mean) / std
    }
}
