use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::capture::domain::frame_source::{CaptureError, CaptureGuard};
use crate::shared::constants::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use crate::shared::frame_slot::LatestFrameSlot;

use super::auto_frame_use_case::AutoFrameUseCase;

/// Why the framing loop ended.
#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    /// `running` was cleared by the presentation side.
    QuitRequested,
    EndOfStream,
    Disconnected(String),
    /// More than the allowed number of back-to-back read/processing failures.
    TooManyFailures { consecutive: usize, last_error: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::QuitRequested => write!(f, "quit requested"),
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::Disconnected(reason) => write!(f, "capture disconnected: {reason}"),
            StopReason::TooManyFailures {
                consecutive,
                last_error,
            } => write!(f, "{consecutive} consecutive capture failures (last: {last_error})"),
        }
    }
}

impl StopReason {
    /// Maps a terminal capture error to the reason the loop stops.
    pub fn from_terminal(error: &CaptureError) -> Self {
        match error {
            CaptureError::EndOfStream => StopReason::EndOfStream,
            other => StopReason::Disconnected(other.to_string()),
        }
    }
}

/// Notifications from the framing loop to the presentation side.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Started,
    FaceAcquired,
    FaceLost,
    Stopped(StopReason),
}

/// Counters reported when the loop ends.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSummary {
    pub frames_framed: usize,
    pub empty_reads: usize,
    pub failures: usize,
    pub reason: StopReason,
}

/// Shared handles the framing loop runs against.
pub struct PipelineConfig {
    pub running: Arc<AtomicBool>,
    pub output: Arc<LatestFrameSlot>,
    pub events: Option<crossbeam_channel::Sender<PipelineEvent>>,
    pub max_consecutive_failures: usize,
}

impl PipelineConfig {
    pub fn new(running: Arc<AtomicBool>, output: Arc<LatestFrameSlot>) -> Self {
        Self {
            running,
            output,
            events: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn with_events(mut self, events: crossbeam_channel::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: usize) -> Self {
        self.max_consecutive_failures = max;
        self
    }
}

/// Handle to a framing loop running in the background.
pub struct PipelineHandle {
    thread: JoinHandle<PipelineSummary>,
}

impl PipelineHandle {
    pub fn new(thread: JoinHandle<PipelineSummary>) -> Self {
        Self { thread }
    }

    /// Waits for the loop to end. Callers clear `running` first to stop a
    /// live capture.
    pub fn join(self) -> Result<PipelineSummary, Box<dyn std::error::Error>> {
        self.thread
            .join()
            .map_err(|_| "framing pipeline thread panicked".into())
    }
}

/// Abstracts how the capture → frame → publish loop is run.
///
/// The capture source arrives already opened, so acquisition failures are
/// reported before anything is spawned.
pub trait PipelineExecutor: Send {
    fn spawn(
        &self,
        capture: CaptureGuard,
        use_case: AutoFrameUseCase,
        config: PipelineConfig,
    ) -> Result<PipelineHandle, Box<dyn std::error::Error>>;
}
