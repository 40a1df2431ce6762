//! The per-frame loop tying capture, detection, the signal controller, and
//! annotation together.
//!
//! One pipeline thread is the sole writer of the traffic state and of the
//! shared latest frame. Detector faults are isolated per frame: the loop
//! keeps serving frames with the last committed state rather than crashing
//! the controller.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use anyhow::{Context, Result};
use tracing::{debug, error, warn};
use vehicle_detect::VehicleDetector;
use video_capture::FrameSource;

use crate::{
    annotate::annotate_frame,
    controller::SignalController,
    data::SharedFrame,
    filter::filter_vehicles,
};

pub struct PipelineOptions {
    pub jpeg_quality: i32,
    pub verbose: bool,
}

/// Install the Ctrl+C handler once and return the flag it sets.
pub fn install_shutdown_handler() -> Arc<AtomicBool> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    shutdown
}

/// Drive the frame loop until the source is exhausted, a fatal error occurs,
/// or `shutdown` is set.
///
/// Per frame: detect, filter to the vehicle whitelist, tick the controller
/// with the count, annotate with the post-tick snapshot, and publish the
/// encoded frame for the HTTP layer. There is no explicit throttling; the
/// cadence is governed by capture and detector latency.
pub fn run_pipeline(
    source: &mut dyn FrameSource,
    detector: &mut dyn VehicleDetector,
    controller: &SignalController,
    shared: &SharedFrame,
    shutdown: &AtomicBool,
    options: &PipelineOptions,
) -> Result<()> {
    let mut frame_number: u64 = 0;
    let mut smoothed_fps: f32 = 0.0;
    let mut last_instant = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame().context("frame capture failed")? else {
            debug!("frame source exhausted; stopping pipeline");
            break;
        };
        frame_number = frame_number.wrapping_add(1);
        let frame_start = Instant::now();

        let elapsed = frame_start.duration_since(last_instant).as_secs_f32();
        last_instant = frame_start;
        if elapsed > 0.0 {
            let instant = 1.0 / elapsed;
            smoothed_fps = if smoothed_fps == 0.0 {
                instant
            } else {
                0.9 * smoothed_fps + 0.1 * instant
            };
        }
        metrics::gauge!("signal_pipeline_fps").set(smoothed_fps as f64);
        metrics::counter!("signal_frames_total").increment(1);

        // A detector fault is recoverable: skip detection for this frame and
        // keep serving the last committed state. Malformed detector output is
        // a bug signal; drop the whole frame loudly.
        let vehicles = match detector.detect(&frame) {
            Ok(raw) => match filter_vehicles(&raw) {
                Ok(vehicles) => Some(vehicles),
                Err(err) => {
                    error!("frame #{frame_number}: {err}");
                    metrics::counter!("signal_invalid_detections_total").increment(1);
                    continue;
                }
            },
            Err(err) => {
                warn!("frame #{frame_number}: detector failed: {err}");
                metrics::counter!("signal_detector_errors_total").increment(1);
                None
            }
        };

        let state = match &vehicles {
            Some(vehicles) => controller.tick(vehicles.len() as u32, Instant::now())?,
            None => controller.snapshot()?,
        };

        if options.verbose {
            if let Some(vehicles) = &vehicles {
                debug!(
                    "frame #{frame_number}: {} vehicle(s), signal {}",
                    vehicles.len(),
                    state.signal.as_str()
                );
            }
        }

        let boxes = vehicles.as_deref().unwrap_or(&[]);
        let packet = annotate_frame(
            &frame,
            boxes,
            state,
            frame_number,
            smoothed_fps,
            options.jpeg_quality,
        )?;
        if let Ok(mut guard) = shared.lock() {
            *guard = Some(packet);
        }

        metrics::histogram!("signal_frame_seconds").record(frame_start.elapsed().as_secs_f64());

        if frame_number % 30 == 0 {
            debug!(
                "pipeline heartbeat: frame #{frame_number}, {:.1} fps, signal {}, {} vehicle(s)",
                smoothed_fps,
                state.signal.as_str(),
                state.vehicle_count
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Instant,
    };

    use anyhow::anyhow;
    use vehicle_detect::{Detection, DetectorError};
    use video_capture::{CaptureError, Frame, FrameFormat};

    use super::*;
    use crate::data::SignalPhase;

    fn frame() -> Frame {
        Frame {
            data: vec![0x20; 16 * 16 * 3],
            width: 16,
            height: 16,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    fn car(x: f32) -> Detection {
        Detection {
            class_id: 2,
            score: 0.8,
            bbox: [x, 1.0, x + 4.0, 6.0],
        }
    }

    /// Source yielding a fixed number of frames, then exhaustion.
    struct ScriptedSource {
        remaining: usize,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(frame()))
        }
    }

    /// Detector replaying a scripted sequence of per-frame results.
    struct ScriptedDetector {
        results: VecDeque<Result<Vec<Detection>, DetectorError>>,
    }

    impl VehicleDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
            self.results
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn run(
        frames: usize,
        results: VecDeque<Result<Vec<Detection>, DetectorError>>,
        controller: &SignalController,
    ) -> SharedFrame {
        let mut source = ScriptedSource { remaining: frames };
        let mut detector = ScriptedDetector { results };
        let shared: SharedFrame = Arc::new(Mutex::new(None));
        let shutdown = AtomicBool::new(false);
        let options = PipelineOptions {
            jpeg_quality: 80,
            verbose: false,
        };
        run_pipeline(
            &mut source,
            &mut detector,
            controller,
            &shared,
            &shutdown,
            &options,
        )
        .unwrap();
        shared
    }

    #[test]
    fn stops_cleanly_when_the_source_is_exhausted() {
        let controller = SignalController::new(Instant::now());
        let shared = run(0, VecDeque::new(), &controller);
        assert!(shared.lock().unwrap().is_none());
    }

    #[test]
    fn publishes_annotated_frames_with_the_tick_count() {
        let controller = SignalController::new(Instant::now());
        let results = VecDeque::from([Ok(vec![car(1.0), car(8.0)])]);
        let shared = run(1, results, &controller);

        let packet = shared.lock().unwrap().clone().expect("frame published");
        assert_eq!(packet.frame_number, 1);
        assert_eq!(packet.state.vehicle_count, 2);
        assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(controller.snapshot().unwrap().vehicle_count, 2);
    }

    #[test]
    fn detector_failure_leaves_state_untouched_and_keeps_streaming() {
        let controller = SignalController::new(Instant::now());
        let results = VecDeque::from([
            Ok(vec![car(1.0), car(6.0), car(11.0)]),
            Err(DetectorError::Inference(anyhow!("backend exploded"))),
        ]);
        let shared = run(2, results, &controller);

        // The bad frame is still served, rendered from the last committed
        // state; the count is not overwritten.
        let packet = shared.lock().unwrap().clone().expect("frame published");
        assert_eq!(packet.frame_number, 2);
        assert_eq!(packet.state.vehicle_count, 3);
        assert_eq!(controller.snapshot().unwrap().vehicle_count, 3);
    }

    #[test]
    fn next_good_frame_resumes_ticking_after_a_failure() {
        let controller = SignalController::new(Instant::now());
        let results = VecDeque::from([
            Err(DetectorError::Inference(anyhow!("flaky"))),
            Ok(vec![car(2.0)]),
        ]);
        let shared = run(2, results, &controller);

        let packet = shared.lock().unwrap().clone().expect("frame published");
        assert_eq!(packet.frame_number, 2);
        assert_eq!(packet.state.vehicle_count, 1);
    }

    #[test]
    fn malformed_detection_aborts_only_that_frame() {
        let controller = SignalController::new(Instant::now());
        let bad = Detection {
            class_id: 7,
            score: 0.9,
            bbox: [10.0, 10.0, 5.0, 5.0],
        };
        let results = VecDeque::from([Ok(vec![bad]), Ok(vec![car(3.0)])]);
        let shared = run(2, results, &controller);

        // Frame 1 was dropped entirely; frame 2 went through.
        let packet = shared.lock().unwrap().clone().expect("frame published");
        assert_eq!(packet.frame_number, 2);
        assert_eq!(packet.state.vehicle_count, 1);
        assert_eq!(packet.state.signal, SignalPhase::Red);
    }

    #[test]
    fn shutdown_flag_stops_the_loop_before_capture() {
        let mut source = ScriptedSource { remaining: 100 };
        let mut detector = ScriptedDetector {
            results: VecDeque::new(),
        };
        let controller = SignalController::new(Instant::now());
        let shared: SharedFrame = Arc::new(Mutex::new(None));
        let shutdown = AtomicBool::new(true);
        let options = PipelineOptions {
            jpeg_quality: 80,
            verbose: false,
        };
        run_pipeline(
            &mut source,
            &mut detector,
            &controller,
            &shared,
            &shutdown,
            &options,
        )
        .unwrap();
        assert_eq!(source.remaining, 100);
        assert!(shared.lock().unwrap().is_none());
    }
}
