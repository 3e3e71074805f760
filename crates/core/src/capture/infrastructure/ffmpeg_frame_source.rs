use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{CaptureError, CaptureMetadata, FrameSource};
use crate::shared::frame::Frame;

/// What to capture from.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureTarget {
    /// Platform camera device: an index (`"0"`) or a backend-specific name.
    Device(String),
    /// Recorded video replayed as if it were live.
    File(PathBuf),
}

/// Requested camera mode. Devices may negotiate something close instead.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub target: CaptureTarget,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Camera / file capture via ffmpeg-next (libavdevice + libavcodec).
///
/// Devices are opened through the platform input format (`video4linux2`,
/// `avfoundation` or `dshow`) asking for MJPEG. Decoded frames are converted
/// to RGB24.
pub struct FfmpegFrameSource {
    request: CaptureRequest,
    realtime_replay: bool,
    stream: Option<OpenStream>,
}

struct OpenStream {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ScalerState>,
    video_stream_index: usize,
    is_device: bool,
    frame_interval: Option<Duration>,
    last_frame_at: Option<Instant>,
    frame_index: usize,
    flushing: bool,
}

struct ScalerState {
    context: ffmpeg_next::software::scaling::Context,
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
}

// Safety: FfmpegFrameSource is only used from the pipeline thread once moved
// there. The raw pointers inside ffmpeg types are never shared.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new(request: CaptureRequest) -> Self {
        Self {
            request,
            realtime_replay: false,
            stream: None,
        }
    }

    /// Paces file replay at the file's frame rate instead of decoding as fast
    /// as possible. Has no effect on devices.
    pub fn with_realtime_replay(mut self, enabled: bool) -> Self {
        self.realtime_replay = enabled;
        self
    }

    fn source_name(&self) -> String {
        match &self.request.target {
            CaptureTarget::Device(name) => format!("device {name}"),
            CaptureTarget::File(path) => path.display().to_string(),
        }
    }

    fn open_input(&self) -> Result<(ffmpeg_next::format::context::Input, String), String> {
        match &self.request.target {
            CaptureTarget::File(path) => {
                let input = ffmpeg_next::format::input(path).map_err(|e| e.to_string())?;
                Ok((input, "file".to_string()))
            }
            CaptureTarget::Device(name) => {
                ffmpeg_next::device::register_all();
                let backend = platform_backend();
                let format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == backend)
                    .ok_or_else(|| format!("input device format '{backend}' is not available"))?;

                let url = device_url(backend, name);
                let options = device_options(backend, &self.request);
                log::debug!("Opening {backend} device '{url}'");

                match ffmpeg_next::format::open_with(
                    &url,
                    &ffmpeg_next::format::Format::Input(format),
                    options,
                ) {
                    Ok(ffmpeg_next::format::context::Context::Input(input)) => {
                        Ok((input, backend.to_string()))
                    }
                    Ok(_) => Err("device did not open as an input".to_string()),
                    Err(e) => Err(e.to_string()),
                }
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<CaptureMetadata, CaptureError> {
        let open_error = |reason: String| CaptureError::Open {
            source_name: self.source_name(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_error(e.to_string()))?;
        let (input, backend) = self.open_input().map_err(open_error)?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_error("no video stream found".to_string()))?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_error(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| open_error(e.to_string()))?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        drop(stream);

        let is_device = matches!(self.request.target, CaptureTarget::Device(_));
        let frame_interval = (!is_device && self.realtime_replay && fps > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / fps));

        let metadata = CaptureMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            backend,
        };
        log::info!(
            "Capture opened: {} {}x{} @ {:.1} fps via {}",
            self.source_name(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.backend
        );

        self.stream = Some(OpenStream {
            input,
            decoder,
            scaler: None,
            video_stream_index,
            is_device,
            frame_interval,
            last_frame_at: None,
            frame_index: 0,
            flushing: false,
        });
        Ok(metadata)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotOpen)?;

        if let Some(frame) = stream.try_receive()? {
            return Ok(Some(frame));
        }
        if stream.flushing {
            return Err(CaptureError::EndOfStream);
        }

        let next_packet = stream
            .input
            .packets()
            .next()
            .map(|(s, packet)| (s.index(), packet));
        match next_packet {
            Some((index, packet)) => {
                if index != stream.video_stream_index {
                    return Ok(None);
                }
                stream
                    .decoder
                    .send_packet(&packet)
                    .map_err(|e| CaptureError::Read(e.to_string()))?;
                stream.try_receive()
            }
            None if stream.is_device => {
                Err(CaptureError::Disconnected("device stopped delivering packets".into()))
            }
            None => {
                if let Err(e) = stream.decoder.send_eof() {
                    log::debug!("Decoder flush failed: {e}");
                }
                stream.flushing = true;
                match stream.try_receive()? {
                    Some(frame) => Ok(Some(frame)),
                    None => Err(CaptureError::EndOfStream),
                }
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Capture closed: {}", self.source_name());
        }
    }
}

impl OpenStream {
    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let scaler = self.scaler_for(decoded.format(), width, height)?;
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        let frame = Frame::new(pixels, width, height, self.frame_index);
        self.frame_index += 1;
        self.pace();
        Ok(Some(frame))
    }

    /// Builds the RGB24 scaler lazily and rebuilds it if the decoded format
    /// changes mid-stream.
    fn scaler_for(
        &mut self,
        format: ffmpeg_next::format::Pixel,
        width: u32,
        height: u32,
    ) -> Result<&mut ffmpeg_next::software::scaling::Context, CaptureError> {
        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.format != format || s.width != width || s.height != height);
        if stale {
            let context = ffmpeg_next::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| CaptureError::Read(e.to_string()))?;
            self.scaler = Some(ScalerState {
                context,
                format,
                width,
                height,
            });
        }
        match self.scaler.as_mut() {
            Some(state) => Ok(&mut state.context),
            None => Err(CaptureError::Read("scaler unavailable".into())),
        }
    }

    fn pace(&mut self) {
        let Some(interval) = self.frame_interval else {
            return;
        };
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

fn platform_backend() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "video4linux2"
    }
}

/// Turns a user-facing device name into the URL the backend expects.
fn device_url(backend: &str, name: &str) -> String {
    let is_index = !name.is_empty() && name.chars().all(|c| c.is_ascii_digit());
    match backend {
        "video4linux2" if is_index => format!("/dev/video{name}"),
        "avfoundation" if is_index => format!("{name}:none"),
        "dshow" if !name.starts_with("video=") => format!("video={name}"),
        _ => name.to_string(),
    }
}

fn device_options(backend: &str, request: &CaptureRequest) -> ffmpeg_next::Dictionary<'static> {
    let mut options = ffmpeg_next::Dictionary::new();
    options.set("video_size", &format!("{}x{}", request.width, request.height));
    options.set("framerate", &request.fps.to_string());
    match backend {
        "video4linux2" => options.set("input_format", "mjpeg"),
        "dshow" => options.set("vcodec", "mjpeg"),
        _ => {}
    }
    options
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
