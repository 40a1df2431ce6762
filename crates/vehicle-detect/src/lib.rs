//! Object-detection boundary for the traffic-signal pipeline.
//!
//! The pipeline never assumes detector internals; it sees a sequence of
//! [`Detection`]s per frame through the [`VehicleDetector`] trait. The
//! TorchScript implementation lives behind the `with-tch` feature.

use std::path::PathBuf;

use thiserror::Error;
use video_capture::Frame;

#[cfg(feature = "with-tch")]
mod yolo;

#[cfg(feature = "with-tch")]
pub use tch;
#[cfg(feature = "with-tch")]
pub use yolo::YoloDetector;

/// Single detection in frame-pixel coordinates (x1, y1, x2, y2).
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_id: i64,
    pub score: f32,
    pub bbox: [f32; 4],
}

/// Per-frame detector failure; recoverable at the pipeline level.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to load detector model from {path:?}")]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("malformed frame: {0}")]
    BadFrame(String),
    #[error("inference failed: {0}")]
    Inference(#[from] anyhow::Error),
}

/// Opaque per-frame classifier. Confidence filtering and suppression are the
/// implementation's business; callers only see the surviving detections.
pub trait VehicleDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}
