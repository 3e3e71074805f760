use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::tracking_state_machine::{
    TrackEvent, TrackOutcome, TrackingPolicy, TrackingStateMachine,
};
use crate::framing::domain::crop_geometry::{compute_crop_rect, CropRect};
use crate::framing::domain::frame_cropper::FrameCropper;
use crate::framing::domain::framing_engine::{FramingCurrent, FramingEngine};
use crate::shared::frame::Frame;
use crate::shared::framing_config::FramingConfig;

use super::pipeline_logger::PipelineLogger;

/// One input frame after tracking, smoothing and crop/resize.
#[derive(Debug)]
pub struct FramedFrame {
    pub frame: Frame,
    pub outcome: TrackOutcome,
    pub framing: FramingCurrent,
    pub crop: CropRect,
}

/// Per-frame auto-framing: track the face, move the goal, smooth toward it,
/// then crop and scale back to the input size.
///
/// Framing parameters are re-read from the shared [`FramingConfig`] on every
/// frame, so key presses take effect on the next frame.
pub struct AutoFrameUseCase {
    tracking: TrackingStateMachine,
    cropper: Box<dyn FrameCropper>,
    config: Arc<FramingConfig>,
    logger: Box<dyn PipelineLogger>,
    engine: Option<FramingEngine>,
    frames: usize,
}

impl AutoFrameUseCase {
    pub fn new(
        tracking: TrackingStateMachine,
        cropper: Box<dyn FrameCropper>,
        config: Arc<FramingConfig>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            tracking,
            cropper,
            config,
            logger,
            engine: None,
            frames: 0,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.is_tracking()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn process(&mut self, frame: &Frame) -> Result<FramedFrame, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err("cannot frame an empty image".into());
        }
        let (width, height) = (frame.width(), frame.height());
        let params = self.config.snapshot();

        let t0 = Instant::now();
        let outcome = self.tracking.step(frame, &TrackingPolicy::from(&params));
        let stage = if outcome.event.searched() {
            "locate"
        } else {
            "track"
        };
        self.logger.timing(stage, elapsed_ms(t0));

        // A resolution change restarts framing centered and unzoomed.
        if self.engine.as_ref().map(FramingEngine::frame_size) != Some((width, height)) {
            log::debug!("Framing {width}x{height} input");
            self.engine = None;
        }
        let engine = self
            .engine
            .get_or_insert_with(|| FramingEngine::new(width, height));
        if let Some(face) = &outcome.face {
            engine.update_goal(face, height, &params);
        }
        let framing = engine.smooth(&params);

        let crop = compute_crop_rect(width, height, framing.center, framing.zoom_scale)
            .ok_or("frame has no area to crop")?;
        let t1 = Instant::now();
        let framed = self.cropper.crop_resize(frame, &crop, (width, height))?;
        self.logger.timing("crop", elapsed_ms(t1));

        self.logger.metric("zoom", framing.zoom_scale);
        if let TrackEvent::Tracked { quality } = outcome.event {
            self.logger.metric("quality", quality);
        }
        self.frames += 1;
        self.logger.progress(self.frames);

        Ok(FramedFrame {
            frame: framed,
            outcome,
            framing,
            crop,
        })
    }

    pub fn summary(&self) {
        self.logger.summary();
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
