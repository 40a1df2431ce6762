//! Frame acquisition boundary for the traffic-signal pipeline.
//!
//! The pipeline pulls frames synchronously through the [`FrameSource`] trait;
//! `Ok(None)` marks an exhausted source (end of file, disconnected device) and
//! ends the stream without being an error. The OpenCV-backed [`CameraSource`]
//! lives behind the `camera` feature so the rest of the workspace builds and
//! tests without the native toolchain.

#[cfg(feature = "camera")]
mod camera;
mod types;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use types::{CaptureError, Frame, FrameFormat, FrameSource};
