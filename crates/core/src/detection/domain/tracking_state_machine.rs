use crate::detection::domain::face_locator::FaceLocator;
use crate::detection::domain::object_tracker::{ObjectTracker, TrackerFactory};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::framing_config::FramingParams;

/// Limits that decide when a track is trusted and when to search again.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackingPolicy {
    pub lifetime: u32,
    pub downtime_threshold: u32,
    pub quality_threshold: f64,
}

impl From<&FramingParams> for TrackingPolicy {
    fn from(params: &FramingParams) -> Self {
        Self {
            lifetime: params.lifetime,
            downtime_threshold: params.downtime_threshold,
            quality_threshold: params.quality_threshold,
        }
    }
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self::from(&FramingParams::default())
    }
}

/// The single tracking state. A tracker never exists without its lifetime
/// counter and vice versa.
pub enum TrackState {
    /// No active track; counts frames since the last failed search.
    Idle { downtime: u32 },
    /// Active tracker with a countdown to forced re-detection.
    Tracking {
        tracker: Box<dyn ObjectTracker>,
        frames_remaining: u32,
    },
}

impl std::fmt::Debug for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackState::Idle { downtime } => f.debug_struct("Idle").field("downtime", downtime).finish(),
            TrackState::Tracking {
                frames_remaining, ..
            } => f
                .debug_struct("Tracking")
                .field("frames_remaining", frames_remaining)
                .finish_non_exhaustive(),
        }
    }
}

/// What happened during one step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackEvent {
    /// Idle cooldown, nothing ran.
    Waiting,
    /// Searched from idle and found nothing.
    SearchFailed,
    /// Searched from idle and started a track.
    Acquired,
    /// Existing tracker updated above the quality threshold.
    Tracked { quality: f64 },
    /// Track expired or degraded; the immediate re-search found nothing.
    Lost,
    /// Track expired or degraded; the immediate re-search started a new one.
    Reacquired,
}

impl TrackEvent {
    /// True when the face locator ran during this step.
    pub fn searched(&self) -> bool {
        !matches!(self, TrackEvent::Waiting | TrackEvent::Tracked { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackOutcome {
    pub face: Option<BoundingBox>,
    pub event: TrackEvent,
}

/// Decides per frame whether to run the (expensive) face locator, advance
/// the (cheap) tracker, or wait out the idle cooldown.
pub struct TrackingStateMachine {
    locator: Box<dyn FaceLocator>,
    tracker_factory: Box<dyn TrackerFactory>,
    state: TrackState,
}

impl TrackingStateMachine {
    /// Starts idle with the counter already past `downtime_threshold`, so the
    /// very first frame searches.
    pub fn new(
        locator: Box<dyn FaceLocator>,
        tracker_factory: Box<dyn TrackerFactory>,
        downtime_threshold: u32,
    ) -> Self {
        Self::with_state(
            locator,
            tracker_factory,
            TrackState::Idle {
                downtime: downtime_threshold.saturating_add(1),
            },
        )
    }

    pub fn with_state(
        locator: Box<dyn FaceLocator>,
        tracker_factory: Box<dyn TrackerFactory>,
        state: TrackState,
    ) -> Self {
        Self {
            locator,
            tracker_factory,
            state,
        }
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackState::Tracking { .. })
    }

    pub fn step(&mut self, frame: &Frame, policy: &TrackingPolicy) -> TrackOutcome {
        let state = std::mem::replace(&mut self.state, TrackState::Idle { downtime: 0 });

        let (next, outcome) = match state {
            TrackState::Idle { downtime } if downtime > policy.downtime_threshold => {
                let (next, face) = self.search(frame, policy);
                let event = if face.is_some() {
                    TrackEvent::Acquired
                } else {
                    TrackEvent::SearchFailed
                };
                (next, TrackOutcome { face, event })
            }
            TrackState::Idle { downtime } => (
                TrackState::Idle {
                    downtime: downtime.saturating_add(1),
                },
                TrackOutcome {
                    face: None,
                    event: TrackEvent::Waiting,
                },
            ),
            TrackState::Tracking {
                tracker,
                frames_remaining,
            } => self.advance(tracker, frames_remaining, frame, policy),
        };

        self.state = next;
        outcome
    }

    fn advance(
        &mut self,
        mut tracker: Box<dyn ObjectTracker>,
        frames_remaining: u32,
        frame: &Frame,
        policy: &TrackingPolicy,
    ) -> (TrackState, TrackOutcome) {
        if frames_remaining > 0 {
            let quality = tracker.update(frame);
            if quality > policy.quality_threshold {
                let face = tracker.current_box();
                return (
                    TrackState::Tracking {
                        tracker,
                        frames_remaining: frames_remaining - 1,
                    },
                    TrackOutcome {
                        face: Some(face),
                        event: TrackEvent::Tracked { quality },
                    },
                );
            }
            log::debug!(
                "Frame {}: tracker quality {quality:.2} <= {:.2}, re-searching",
                frame.index(),
                policy.quality_threshold
            );
        } else {
            log::debug!("Frame {}: track lifetime expired, re-searching", frame.index());
        }

        drop(tracker);
        let (next, face) = self.search(frame, policy);
        let event = if face.is_some() {
            TrackEvent::Reacquired
        } else {
            TrackEvent::Lost
        };
        (next, TrackOutcome { face, event })
    }

    /// Runs the locator and starts a tracker on the first valid box.
    ///
    /// Locator and tracker failures are logged and treated as "no face".
    fn search(&mut self, frame: &Frame, policy: &TrackingPolicy) -> (TrackState, Option<BoundingBox>) {
        let idle = TrackState::Idle { downtime: 0 };

        let boxes = match self.locator.locate(frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!("Face locator failed on frame {}: {e}", frame.index());
                return (idle, None);
            }
        };

        let Some(face) = boxes.into_iter().find(BoundingBox::is_valid) else {
            return (idle, None);
        };

        match self.tracker_factory.start(frame, &face) {
            Ok(tracker) => (
                TrackState::Tracking {
                    tracker,
                    frames_remaining: policy.lifetime,
                },
                Some(face),
            ),
            Err(e) => {
                log::warn!("Could not start tracker on frame {}: {e}", frame.index());
                (idle, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubLocator {
        results: VecDeque<Vec<BoundingBox>>,
        fallback: Vec<BoundingBox>,
        calls: Arc<AtomicUsize>,
    }

    impl StubLocator {
        fn always(boxes: Vec<BoundingBox>, calls: Arc<AtomicUsize>) -> Self {
            Self {
                results: VecDeque::new(),
                fallback: boxes,
                calls,
            }
        }

        fn sequence(results: Vec<Vec<BoundingBox>>, calls: Arc<AtomicUsize>) -> Self {
            Self {
                results: results.into(),
                fallback: Vec::new(),
                calls,
            }
        }
    }

    impl FaceLocator for StubLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .results
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()))
        }
    }

    struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            Err("model exploded".into())
        }
    }

    struct StubTracker {
        target: BoundingBox,
        qualities: Arc<Mutex<VecDeque<f64>>>,
    }

    impl ObjectTracker for StubTracker {
        fn update(&mut self, _frame: &Frame) -> f64 {
            self.qualities.lock().unwrap().pop_front().unwrap_or(10.0)
        }

        fn current_box(&self) -> BoundingBox {
            self.target
        }
    }

    struct StubTrackerFactory {
        qualities: Arc<Mutex<VecDeque<f64>>>,
        starts: Arc<AtomicUsize>,
    }

    impl StubTrackerFactory {
        fn new(qualities: Vec<f64>) -> Self {
            Self {
                qualities: Arc::new(Mutex::new(qualities.into())),
                starts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TrackerFactory for StubTrackerFactory {
        fn start(
            &self,
            _frame: &Frame,
            target: &BoundingBox,
        ) -> Result<Box<dyn ObjectTracker>, Box<dyn std::error::Error>> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubTracker {
                target: *target,
                qualities: self.qualities.clone(),
            }))
        }
    }

    struct FailingTrackerFactory;

    impl TrackerFactory for FailingTrackerFactory {
        fn start(
            &self,
            _frame: &Frame,
            _target: &BoundingBox,
        ) -> Result<Box<dyn ObjectTracker>, Box<dyn std::error::Error>> {
            Err("patch too small".into())
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::filled(64, 48, [0, 0, 0], index)
    }

    fn face() -> BoundingBox {
        BoundingBox::new(500.0, 200.0, 700.0, 500.0)
    }

    fn policy(lifetime: u32, downtime_threshold: u32) -> TrackingPolicy {
        TrackingPolicy {
            lifetime,
            downtime_threshold,
            quality_threshold: 7.0,
        }
    }

    fn frames_remaining(sm: &TrackingStateMachine) -> Option<u32> {
        match sm.state() {
            TrackState::Tracking {
                frames_remaining, ..
            } => Some(*frames_remaining),
            TrackState::Idle { .. } => None,
        }
    }

    fn downtime(sm: &TrackingStateMachine) -> Option<u32> {
        match sm.state() {
            TrackState::Idle { downtime } => Some(*downtime),
            TrackState::Tracking { .. } => None,
        }
    }

    #[test]
    fn test_first_frame_searches_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = StubLocator::always(vec![face()], calls.clone());
        let mut sm = TrackingStateMachine::new(
            Box::new(locator),
            Box::new(StubTrackerFactory::new(vec![])),
            30,
        );

        let outcome = sm.step(&frame(0), &policy(100, 30));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.event, TrackEvent::Acquired);
        assert_eq!(outcome.face, Some(face()));
        assert_eq!(frames_remaining(&sm), Some(100));
    }

    #[test]
    fn test_lifetime_countdown_then_forced_research() {
        let lifetime = 5;
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = StubLocator::always(vec![face()], calls.clone());
        let factory = StubTrackerFactory::new(vec![]);
        let starts = factory.starts.clone();
        let mut sm = TrackingStateMachine::with_state(
            Box::new(locator),
            Box::new(factory),
            TrackState::Idle { downtime: 31 },
        );
        let p = policy(lifetime, 30);

        sm.step(&frame(0), &p);
        assert_eq!(frames_remaining(&sm), Some(lifetime));

        for i in 0..lifetime {
            let outcome = sm.step(&frame(1 + i as usize), &p);
            assert_eq!(outcome.event, TrackEvent::Tracked { quality: 10.0 });
            assert_eq!(frames_remaining(&sm), Some(lifetime - 1 - i));
        }
        assert_eq!(frames_remaining(&sm), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let outcome = sm.step(&frame(99), &p);
        assert_eq!(outcome.event, TrackEvent::Reacquired);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(frames_remaining(&sm), Some(lifetime));
    }

    #[test]
    fn test_failed_search_resets_downtime() {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = StubLocator::always(vec![], calls.clone());
        let mut sm = TrackingStateMachine::new(
            Box::new(locator),
            Box::new(StubTrackerFactory::new(vec![])),
            3,
        );
        let p = policy(100, 3);

        assert_eq!(sm.step(&frame(0), &p).event, TrackEvent::SearchFailed);
        assert_eq!(downtime(&sm), Some(0));

        // 0 -> 1 -> 2 -> 3 -> 4, searching only once the counter exceeds 3
        for expected in 1..=4 {
            assert_eq!(sm.step(&frame(expected as usize), &p).event, TrackEvent::Waiting);
            assert_eq!(downtime(&sm), Some(expected));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(sm.step(&frame(5), &p).event, TrackEvent::SearchFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_low_quality_triggers_immediate_research() {
        let calls = Arc::new(AtomicUsize::new(0));
        let second = BoundingBox::new(10.0, 10.0, 60.0, 70.0);
        let locator = StubLocator::sequence(vec![vec![face()], vec![second]], calls.clone());
        let mut sm = TrackingStateMachine::new(
            Box::new(locator),
            Box::new(StubTrackerFactory::new(vec![12.0, 7.0])),
            30,
        );
        let p = policy(100, 30);

        sm.step(&frame(0), &p);
        assert_eq!(sm.step(&frame(1), &p).event, TrackEvent::Tracked { quality: 12.0 });

        // quality exactly at the threshold counts as lost
        let outcome = sm.step(&frame(2), &p);
        assert_eq!(outcome.event, TrackEvent::Reacquired);
        assert_eq!(outcome.face, Some(second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lost_track_with_no_face_goes_idle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let locator = StubLocator::sequence(vec![vec![face()], vec![]], calls.clone());
        let mut sm = TrackingStateMachine::new(
            Box::new(locator),
            Box::new(StubTrackerFactory::new(vec![1.0])),
            30,
        );
        let p = policy(100, 30);

        sm.step(&frame(0), &p);
        let outcome = sm.step(&frame(1), &p);
        assert_eq!(outcome.event, TrackEvent::Lost);
        assert!(outcome.face.is_none());
        assert_eq!(downtime(&sm), Some(0));
    }

    #[test]
    fn test_takes_first_valid_box() {
        let calls = Arc::new(AtomicUsize::new(0));
        let degenerate = BoundingBox::new(10.0, 10.0, 10.0, 50.0);
        let first = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let second = BoundingBox::new(300.0, 100.0, 400.0, 200.0);
        let locator = StubLocator::always(vec![degenerate, first, second], calls);
        let mut sm = TrackingStateMachine::new(
            Box::new(locator),
            Box::new(StubTrackerFactory::new(vec![])),
            30,
        );

        let outcome = sm.step(&frame(0), &policy(100, 30));
        assert_eq!(outcome.face, Some(first));
    }

    #[test]
    fn test_locator_error_is_treated_as_no_face() {
        let mut sm = TrackingStateMachine::new(
            Box::new(FailingLocator),
            Box::new(StubTrackerFactory::new(vec![])),
            30,
        );
        let outcome = sm.step(&frame(0), &policy(100, 30));
        assert_eq!(outcome.event, TrackEvent::SearchFailed);
        assert_eq!(downtime(&sm), Some(0));
    }

    #[test]
    fn test_tracker_start_error_is_treated_as_no_face() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut sm = TrackingStateMachine::new(
            Box::new(StubLocator::always(vec![face()], calls)),
            Box::new(FailingTrackerFactory),
            30,
        );
        let outcome = sm.step(&frame(0), &policy(100, 30));
        assert_eq!(outcome.event, TrackEvent::SearchFailed);
        assert!(!sm.is_tracking());
    }

    #[test]
    fn test_zero_lifetime_researches_every_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut sm = TrackingStateMachine::new(
            Box::new(StubLocator::always(vec![face()], calls.clone())),
            Box::new(StubTrackerFactory::new(vec![])),
            30,
        );
        let p = policy(0, 30);
        for i in 0..4 {
            sm.step(&frame(i), &p);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_event_searched_flag() {
        assert!(!TrackEvent::Waiting.searched());
        assert!(!TrackEvent::Tracked { quality: 9.0 }.searched());
        assert!(TrackEvent::Acquired.searched());
        assert!(TrackEvent::SearchFailed.searched());
        assert!(TrackEvent::Lost.searched());
        assert!(TrackEvent::Reacquired.searched());
    }

    #[test]
    fn test_debug_format_hides_tracker() {
        let state = TrackState::Idle { downtime: 4 };
        assert_eq!(format!("{state:?}"), "Idle { downtime: 4 }");
    }
}
