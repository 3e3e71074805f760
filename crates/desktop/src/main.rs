mod app;
mod settings;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use autoframe_core::capture::domain::frame_source::CaptureGuard;
use autoframe_core::capture::infrastructure::ffmpeg_frame_source::{
    CaptureRequest, CaptureTarget, FfmpegFrameSource,
};
use autoframe_core::detection::domain::tracking_state_machine::TrackingStateMachine;
use autoframe_core::detection::infrastructure::correlation_tracker::CorrelationTrackerFactory;
use autoframe_core::detection::infrastructure::model_resolver;
use autoframe_core::detection::infrastructure::onnx_yolo_locator::OnnxYoloLocator;
use autoframe_core::framing::infrastructure::cpu_frame_cropper::CpuFrameCropper;
use autoframe_core::pipeline::auto_frame_use_case::AutoFrameUseCase;
use autoframe_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use autoframe_core::pipeline::pipeline_executor::{PipelineConfig, PipelineExecutor};
use autoframe_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use autoframe_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use autoframe_core::shared::frame_slot::LatestFrameSlot;
use autoframe_core::shared::framing_config::FramingConfig;

use app::{App, Session};
use settings::Settings;

/// Keeps the face in a webcam feed centered and zoomed.
///
/// Keys: q quit, z/x zoom in/out, w/s move the framing point up/down,
/// a/d move it left/right.
#[derive(Parser)]
#[command(name = "autoframe")]
struct Cli {
    /// Settings file (default: <config dir>/AutoFrame/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera index or device name.
    #[arg(long)]
    device: Option<String>,

    /// Replay a video file instead of opening a camera.
    #[arg(long, conflicts_with = "device")]
    input: Option<PathBuf>,

    /// Decode replayed files as fast as possible instead of at their frame rate.
    #[arg(long)]
    no_realtime: bool,

    /// Requested capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Requested capture frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Face model (ONNX). Downloaded and cached when omitted.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Frames a tracker is trusted before re-detecting.
    #[arg(long)]
    lifetime: Option<u32>,

    /// Frames to wait after a failed search.
    #[arg(long)]
    downtime: Option<u32>,

    /// Tracker quality at or below which the face counts as lost.
    #[arg(long)]
    quality_threshold: Option<f64>,

    /// Framing point within the face box, top (0) to bottom (1).
    #[arg(long)]
    trim_vertical: Option<f64>,

    /// Framing point within the face box, left (0) to right (1).
    #[arg(long)]
    trim_horizontal: Option<f64>,

    /// Zoom trim (0.0-1.0); higher zooms in tighter.
    #[arg(long)]
    trim_zoom: Option<f64>,

    /// Pan smoothing speed multiplier.
    #[arg(long)]
    pan_speed: Option<f64>,

    /// Zoom smoothing speed multiplier.
    #[arg(long)]
    zoom_speed: Option<f64>,

    /// Consecutive capture failures tolerated before stopping.
    #[arg(long)]
    max_failures: Option<usize>,
}

impl Cli {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(device) = &self.device {
            settings.device = device.clone();
            settings.input = None;
        }
        if let Some(input) = &self.input {
            settings.input = Some(input.clone());
        }
        if self.no_realtime {
            settings.realtime_replay = false;
        }
        if let Some(model) = &self.model {
            settings.model_path = Some(model.clone());
        }
        override_field(&mut settings.width, self.width);
        override_field(&mut settings.height, self.height);
        override_field(&mut settings.fps, self.fps);
        override_field(&mut settings.confidence, self.confidence);
        override_field(&mut settings.lifetime, self.lifetime);
        override_field(&mut settings.downtime_threshold, self.downtime);
        override_field(&mut settings.quality_threshold, self.quality_threshold);
        override_field(&mut settings.trim_vertical, self.trim_vertical);
        override_field(&mut settings.trim_horizontal, self.trim_horizontal);
        override_field(&mut settings.trim_zoom, self.trim_zoom);
        override_field(&mut settings.pan_speed, self.pan_speed);
        override_field(&mut settings.zoom_speed, self.zoom_speed);
        override_field(&mut settings.max_consecutive_failures, self.max_failures);
    }
}

fn override_field<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_to(&mut settings);
    settings.validate()?;

    let framing = settings.framing_params();
    let tracking = TrackingStateMachine::new(
        Box::new(build_locator(&settings)?),
        Box::new(CorrelationTrackerFactory::default()),
        framing.downtime_threshold,
    );

    let source = FfmpegFrameSource::new(capture_request(&settings))
        .with_realtime_replay(settings.realtime_replay);
    let (capture, metadata) = CaptureGuard::open(Box::new(source))?;
    log::info!(
        "Capturing {}x{} @ {:.1} fps via {}",
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.backend
    );

    let config = Arc::new(FramingConfig::new(framing));
    let use_case = AutoFrameUseCase::new(
        tracking,
        Box::new(CpuFrameCropper::default()),
        config.clone(),
        Box::new(StdoutPipelineLogger::default()),
    );

    let running = Arc::new(AtomicBool::new(true));
    let output = Arc::new(LatestFrameSlot::new());
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let pipeline_config = PipelineConfig::new(running.clone(), output.clone())
        .with_events(events_tx)
        .with_max_consecutive_failures(settings.max_consecutive_failures);
    let handle = ThreadedPipelineExecutor::new().spawn(capture, use_case, pipeline_config)?;

    let session = Session {
        frames: output,
        config,
        running: running.clone(),
        events: events_rx,
    };
    let ui_result = iced::application(move || App::new(session.clone()), App::update, App::view)
        .title(App::title)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(iced::window::Settings {
            size: iced::Size::new(
                metadata.width.max(320) as f32,
                metadata.height.max(240) as f32 + app::STATUS_BAR_HEIGHT,
            ),
            ..Default::default()
        })
        .run();

    // Closing the window is the same as pressing q.
    running.store(false, Ordering::SeqCst);
    let summary = handle.join()?;
    log::info!(
        "Pipeline stopped ({}): {} frames framed, {} empty reads, {} failures",
        summary.reason,
        summary.frames_framed,
        summary.empty_reads,
        summary.failures
    );
    ui_result?;
    Ok(())
}

fn build_locator(settings: &Settings) -> Result<OnnxYoloLocator, Box<dyn std::error::Error>> {
    let model_path = match &settings.model_path {
        Some(path) => path.clone(),
        None => {
            let progress: model_resolver::ProgressFn = Box::new(download_progress);
            let path =
                model_resolver::resolve(YOLO_MODEL_NAME, YOLO_MODEL_URL, None, Some(progress))?;
            eprintln!();
            path
        }
    };
    log::info!("Loading face model {}", model_path.display());
    OnnxYoloLocator::new(&model_path, settings.confidence)
}

fn capture_request(settings: &Settings) -> CaptureRequest {
    let target = match &settings.input {
        Some(path) => CaptureTarget::File(path.clone()),
        None => CaptureTarget::Device(settings.device.clone()),
    };
    CaptureRequest {
        target,
        width: settings.width,
        height: settings.height,
        fps: settings.fps,
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
