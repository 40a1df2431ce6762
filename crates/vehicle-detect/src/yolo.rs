//! TorchScript YOLO detector wrapper.

use std::path::Path;

use anyhow::anyhow;
use tch::{CModule, Device, Kind, Tensor};
use video_capture::{Frame, FrameFormat};

use crate::{Detection, DetectorError, VehicleDetector};

const MAX_DETECTIONS: usize = 512;

/// TorchScript-backed detector. Expects frames sized to the module's input
/// and returns boxes in the same pixel space.
pub struct YoloDetector {
    module: CModule,
    device: Device,
    input_size: (i64, i64),
    confidence_threshold: f32,
}

impl YoloDetector {
    /// Load a TorchScript module and prepare it for execution on `device`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        input_size: (i64, i64),
    ) -> Result<Self, DetectorError> {
        let module =
            CModule::load_on_device(&model_path, device).map_err(|err| DetectorError::Load {
                path: model_path.as_ref().to_path_buf(),
                source: anyhow!(err),
            })?;
        Ok(Self {
            module,
            device,
            input_size,
            confidence_threshold: 0.25,
        })
    }

    /// Override the confidence threshold used for filtering predictions.
    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    /// Converts a BGR8 frame into a normalized RGB tensor ready for inference.
    fn bgr_to_tensor(&self, frame: &Frame) -> Result<Tensor, DetectorError> {
        if !matches!(frame.format, FrameFormat::Bgr8) {
            return Err(DetectorError::BadFrame("expected a BGR8 frame".to_string()));
        }
        let expected = (frame.width as usize) * (frame.height as usize) * 3;
        if frame.data.len() != expected {
            return Err(DetectorError::BadFrame(format!(
                "unexpected frame buffer size: got {} bytes, expected {expected}",
                frame.data.len()
            )));
        }
        let (in_w, in_h) = self.input_size;
        if (frame.width as i64, frame.height as i64) != (in_w, in_h) {
            return Err(DetectorError::BadFrame(format!(
                "frame size {}x{} does not match detector input {in_w}x{in_h}",
                frame.width, frame.height
            )));
        }

        let tensor = Tensor::from_slice(&frame.data)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h, in_w, 3])
            .flip([3])
            .permute([0, 3, 1, 2])
            / 255.0;

        Ok(tensor)
    }
}

impl VehicleDetector for YoloDetector {
    /// Runs the module and decodes `[1, 4 + classes, n]` predictions into
    /// confidence-filtered, frame-space boxes.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let input = self.bgr_to_tensor(frame)?;
        let output = self
            .module
            .forward_ts(&[input])
            .map_err(|err| DetectorError::Inference(anyhow!(err)))?;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(DetectorError::Inference(anyhow!(
                "unexpected detector output shape: {shape:?}"
            )));
        }
        let channels = shape[1];
        if channels < 5 {
            return Err(DetectorError::Inference(anyhow!(
                "detector output requires at least 5 channels (x,y,w,h,score), got {channels}"
            )));
        }

        let preds = output
            .to_device(Device::Cpu)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows: Vec<Vec<f32>> =
            Vec::<Vec<f32>>::try_from(&preds).map_err(|err| DetectorError::Inference(anyhow!(err)))?;

        let (in_w, in_h) = self.input_size;
        let mut detections = Vec::new();
        for row in rows {
            if row.len() < 5 {
                continue;
            }

            let mut best_score = 0.0f32;
            let mut best_class = 0usize;
            for (idx, score) in row[4..].iter().enumerate() {
                if *score > best_score {
                    best_score = *score;
                    best_class = idx;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            let x1 = (cx - w / 2.0).clamp(0.0, in_w as f32);
            let y1 = (cy - h / 2.0).clamp(0.0, in_h as f32);
            let x2 = (cx + w / 2.0).clamp(0.0, in_w as f32);
            let y2 = (cy + h / 2.0).clamp(0.0, in_h as f32);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            detections.push(Detection {
                class_id: best_class as i64,
                score: best_score,
                bbox: [x1, y1, x2, y2],
            });
            if detections.len() >= MAX_DETECTIONS {
                break;
            }
        }

        Ok(detections)
    }
}
