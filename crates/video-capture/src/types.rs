use anyhow::Error;
use thiserror::Error;

/// Raw BGR8 frame pulled from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error(transparent)]
    Other(#[from] Error),
}

/// Blocking frame supplier consumed by the pipeline loop.
///
/// `next_frame` blocks until a frame is available, returns `Ok(None)` once the
/// source is exhausted or disconnected, and `Err` only for device faults that
/// are not a normal end of stream. Implementations own the device lifecycle
/// and must release it when dropped, whatever the exit path.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}
