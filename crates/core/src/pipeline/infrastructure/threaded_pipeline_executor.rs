use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::domain::frame_source::CaptureGuard;
use crate::pipeline::auto_frame_use_case::AutoFrameUseCase;
use crate::pipeline::pipeline_executor::{
    PipelineConfig, PipelineEvent, PipelineExecutor, PipelineHandle, PipelineSummary, StopReason,
};

/// Runs the framing loop on a dedicated thread.
///
/// Layout: `capture → track/smooth/crop → latest-frame slot`, one frame at a
/// time. The presentation side polls the slot and never blocks the loop.
pub struct ThreadedPipelineExecutor {
    thread_name: String,
}

impl ThreadedPipelineExecutor {
    pub fn new() -> Self {
        Self {
            thread_name: "autoframe-pipeline".to_string(),
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn spawn(
        &self,
        capture: CaptureGuard,
        use_case: AutoFrameUseCase,
        config: PipelineConfig,
    ) -> Result<PipelineHandle, Box<dyn std::error::Error>> {
        let thread = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_loop(capture, use_case, config))?;
        Ok(PipelineHandle::new(thread))
    }
}

/// Clears the shared flag when the loop exits, including by panic.
struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn run_loop(
    mut capture: CaptureGuard,
    mut use_case: AutoFrameUseCase,
    config: PipelineConfig,
) -> PipelineSummary {
    let _clear = ClearOnExit(config.running.clone());
    let notify = |event: PipelineEvent| {
        if let Some(tx) = &config.events {
            let _ = tx.send(event);
        }
    };

    notify(PipelineEvent::Started);
    let mut had_face = false;
    let mut empty_reads = 0;
    let mut failures = 0;
    let mut consecutive = 0;

    let reason = loop {
        if !config.running.load(Ordering::Acquire) {
            break StopReason::QuitRequested;
        }

        let error = match capture.read_frame() {
            Ok(None) => {
                empty_reads += 1;
                continue;
            }
            Ok(Some(frame)) => match use_case.process(&frame) {
                Ok(framed) => {
                    consecutive = 0;
                    config.output.publish(framed.frame);

                    let has_face = use_case.is_tracking();
                    if has_face != had_face {
                        log::info!(
                            "Frame {}: face {}",
                            frame.index(),
                            if has_face { "acquired" } else { "lost" }
                        );
                        notify(if has_face {
                            PipelineEvent::FaceAcquired
                        } else {
                            PipelineEvent::FaceLost
                        });
                        had_face = has_face;
                    }
                    continue;
                }
                Err(e) => e.to_string(),
            },
            Err(e) if e.is_terminal() => break StopReason::from_terminal(&e),
            Err(e) => e.to_string(),
        };

        failures += 1;
        consecutive += 1;
        log::warn!("Capture failure {consecutive}/{}: {error}", config.max_consecutive_failures);
        if consecutive > config.max_consecutive_failures {
            break StopReason::TooManyFailures {
                consecutive,
                last_error: error,
            };
        }
    };

    capture.release();
    config.running.store(false, Ordering::Release);
    log::info!("Framing pipeline stopped: {reason}");
    use_case.summary();
    notify(PipelineEvent::Stopped(reason.clone()));

    PipelineSummary {
        frames_framed: use_case.frames(),
        empty_reads,
        failures,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame_source::tests::ScriptedSource;
    use crate::capture::domain::frame_source::CaptureError;
    use crate::detection::domain::face_locator::FaceLocator;
    use crate::detection::domain::object_tracker::{ObjectTracker, TrackerFactory};
    use crate::detection::domain::tracking_state_machine::TrackingStateMachine;
    use crate::framing::infrastructure::cpu_frame_cropper::CpuFrameCropper;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::Frame;
    use crate::shared::frame_slot::LatestFrameSlot;
    use crate::shared::framing_config::FramingConfig;
    use std::time::{Duration, Instant};

    struct StubLocator(Vec<BoundingBox>);

    impl FaceLocator for StubLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    /// Tracks well for `good_frames` updates, then collapses.
    struct FadingTracker {
        bbox: BoundingBox,
        good_frames: usize,
    }

    impl ObjectTracker for FadingTracker {
        fn update(&mut self, _frame: &Frame) -> f64 {
            if self.good_frames == 0 {
                return 0.0;
            }
            self.good_frames -= 1;
            10.0
        }
        fn current_box(&self) -> BoundingBox {
            self.bbox
        }
    }

    struct FadingTrackerFactory(usize);

    impl TrackerFactory for FadingTrackerFactory {
        fn start(
            &self,
            _frame: &Frame,
            target: &BoundingBox,
        ) -> Result<Box<dyn ObjectTracker>, Box<dyn std::error::Error>> {
            Ok(Box::new(FadingTracker {
                bbox: *target,
                good_frames: self.0,
            }))
        }
    }

    fn use_case(faces: Vec<BoundingBox>, good_frames: usize) -> AutoFrameUseCase {
        let tracking = TrackingStateMachine::new(
            Box::new(StubLocator(faces)),
            Box::new(FadingTrackerFactory(good_frames)),
            30,
        );
        AutoFrameUseCase::new(
            tracking,
            Box::new(CpuFrameCropper::default()),
            Arc::new(FramingConfig::default()),
            Box::new(NullPipelineLogger),
        )
    }

    fn small_frame(index: usize) -> Frame {
        Frame::filled(64, 48, [10, 20, 30], index)
    }

    fn face() -> BoundingBox {
        BoundingBox::new(20.0, 10.0, 40.0, 34.0)
    }

    struct Harness {
        running: Arc<AtomicBool>,
        slot: Arc<LatestFrameSlot>,
        events: crossbeam_channel::Receiver<PipelineEvent>,
        config: Option<PipelineConfig>,
    }

    fn harness(max_failures: usize) -> Harness {
        let running = Arc::new(AtomicBool::new(true));
        let slot = Arc::new(LatestFrameSlot::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = PipelineConfig::new(running.clone(), slot.clone())
            .with_events(tx)
            .with_max_consecutive_failures(max_failures);
        Harness {
            running,
            slot,
            events: rx,
            config: Some(config),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for pipeline");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_quit_while_tracking_releases_capture_once() {
        let mut h = harness(30);
        let (source, closes) = ScriptedSource::endless(small_frame(0));
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let handle = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![face()], usize::MAX), h.config.take().unwrap())
            .unwrap();

        wait_for(|| h.slot.generation() >= 5);
        h.running.store(false, Ordering::Release);
        let summary = handle.join().unwrap();

        assert_eq!(summary.reason, StopReason::QuitRequested);
        assert!(summary.frames_framed >= 5);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        let events: Vec<_> = h.events.try_iter().collect();
        assert_eq!(events.first(), Some(&PipelineEvent::Started));
        assert!(events.contains(&PipelineEvent::FaceAcquired));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Stopped(StopReason::QuitRequested))
        );
    }

    #[test]
    fn test_quit_while_idle_releases_capture_once() {
        let mut h = harness(30);
        let (source, closes) = ScriptedSource::endless(small_frame(0));
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let handle = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![], 0), h.config.take().unwrap())
            .unwrap();

        wait_for(|| h.slot.generation() >= 3);
        h.running.store(false, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_of_stream_stops_and_clears_running() {
        let mut h = harness(30);
        let reads = vec![
            Ok(Some(small_frame(0))),
            Ok(None),
            Ok(Some(small_frame(1))),
            Ok(None),
            Ok(None),
        ];
        let (source, closes) = ScriptedSource::new(reads);
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let summary = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![], 0), h.config.take().unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.frames_framed, 2);
        assert_eq!(summary.empty_reads, 3);
        assert_eq!(h.slot.latest().unwrap().index(), 1);
        assert!(!h.running.load(Ordering::Acquire));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_failures_are_tolerated() {
        let mut h = harness(3);
        let read_err = || Err(CaptureError::Read("corrupt jpeg".into()));
        let reads = vec![
            read_err(),
            read_err(),
            read_err(),
            Ok(Some(small_frame(0))),
            read_err(),
        ];
        let (source, _) = ScriptedSource::new(reads);
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let summary = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![], 0), h.config.take().unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.failures, 4);
        assert_eq!(summary.frames_framed, 1);
    }

    #[test]
    fn test_too_many_consecutive_failures_is_terminal() {
        let mut h = harness(3);
        let reads = (0..10)
            .map(|_| Err(CaptureError::Read("timeout".into())))
            .collect();
        let (source, closes) = ScriptedSource::new(reads);
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let summary = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![], 0), h.config.take().unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(
            summary.reason,
            StopReason::TooManyFailures {
                consecutive: 4,
                last_error: "failed to read frame: timeout".into()
            }
        );
        assert!(!h.running.load(Ordering::Acquire));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_is_terminal() {
        let mut h = harness(30);
        let reads = vec![
            Ok(Some(small_frame(0))),
            Err(CaptureError::Disconnected("unplugged".into())),
        ];
        let (source, _) = ScriptedSource::new(reads);
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        let summary = ThreadedPipelineExecutor::new()
            .spawn(guard, use_case(vec![], 0), h.config.take().unwrap())
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(summary.reason, StopReason::Disconnected(_)));
    }

    #[test]
    fn test_face_lost_event_after_tracker_collapses() {
        let mut h = harness(30);
        let reads = (0..4).map(|i| Ok(Some(small_frame(i)))).collect();
        let (source, _) = ScriptedSource::new(reads);
        let (guard, _) = CaptureGuard::open(Box::new(source)).unwrap();
        // locator finds the face once; the tracker holds for one update
        let tracking = TrackingStateMachine::new(
            Box::new(OneShotLocator(Some(face()))),
            Box::new(FadingTrackerFactory(1)),
            30,
        );
        let uc = AutoFrameUseCase::new(
            tracking,
            Box::new(CpuFrameCropper::default()),
            Arc::new(FramingConfig::default()),
            Box::new(NullPipelineLogger),
        );
        ThreadedPipelineExecutor::new()
            .spawn(guard, uc, h.config.take().unwrap())
            .unwrap()
            .join()
            .unwrap();

        let events: Vec<_> = h.events.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PipelineEvent::Started,
                PipelineEvent::FaceAcquired,
                PipelineEvent::FaceLost,
                PipelineEvent::Stopped(StopReason::EndOfStream),
            ]
        );
    }

    struct OneShotLocator(Option<BoundingBox>);

    impl FaceLocator for OneShotLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            Ok(self.0.take().into_iter().collect())
        }
    }
}
