use crate::shared::frame::Frame;

/// Negotiated capture format, known once the source is open.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub backend: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open capture source {source_name}: {reason}")]
    Open { source_name: String, reason: String },
    #[error("capture source is not open")]
    NotOpen,
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("capture device disconnected: {0}")]
    Disconnected(String),
    #[error("end of stream")]
    EndOfStream,
}

impl CaptureError {
    /// Terminal errors stop the pipeline immediately; the rest are counted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CaptureError::Read(_))
    }
}

/// Live source of RGB frames (camera device or replayed file).
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<CaptureMetadata, CaptureError>;

    /// `Ok(None)` is an empty read: nothing decoded this time, try again.
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Releases the device. Must be idempotent.
    fn close(&mut self);
}

/// Owns an opened [`FrameSource`] and closes it exactly once, when released
/// explicitly or when dropped (including during unwinding).
pub struct CaptureGuard {
    source: Box<dyn FrameSource>,
    released: bool,
}

impl CaptureGuard {
    /// Opens `source`. On failure the source is closed before returning.
    pub fn open(
        mut source: Box<dyn FrameSource>,
    ) -> Result<(Self, CaptureMetadata), CaptureError> {
        match source.open() {
            Ok(metadata) => Ok((
                Self {
                    source,
                    released: false,
                },
                metadata,
            )),
            Err(e) => {
                source.close();
                Err(e)
            }
        }
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Err(CaptureError::NotOpen);
        }
        self.source.read_frame()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.close();
            log::debug!("Capture source released");
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.release();
    }
}
