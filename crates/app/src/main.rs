//! Adaptive traffic-signal monitor: detects vehicles on a live stream, drives
//! a density-aware signal state machine, and serves the annotated feed plus
//! the current signal state over HTTP.

mod annotate;
mod config;
mod controller;
mod data;
mod filter;
mod html;
mod pipeline;
mod server;
mod telemetry;

use anyhow::Result;

use crate::config::Config;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    telemetry::init_tracing();
    let args: Vec<String> = std::env::args().collect();
    let config = Config::from_args(&args)?;
    serve(config)
}

#[cfg(all(feature = "camera", feature = "with-tch"))]
fn serve(config: Config) -> Result<()> {
    use std::{
        sync::{Arc, Mutex},
        time::Instant,
    };

    use anyhow::Context;
    use tracing::info;
    use vehicle_detect::{YoloDetector, tch::Device};
    use video_capture::CameraSource;

    use crate::{
        controller::SignalController,
        data::SharedFrame,
        pipeline::{PipelineOptions, install_shutdown_handler, run_pipeline},
        server::spawn_server,
    };

    let _ = telemetry::init_metrics_recorder();

    info!(
        "starting traffic-signal pipeline (source: {}, model: {}, {}x{})",
        config.source,
        config.model_path.display(),
        config.width,
        config.height
    );

    let mut source = CameraSource::open(&config.source, (config.width, config.height))
        .context("failed to open frame source")?;

    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    let mut detector = YoloDetector::new(
        &config.model_path,
        device,
        (config.width as i64, config.height as i64),
    )?
    .with_confidence_threshold(config.confidence);
    info!("detector ready on {device:?}");

    let controller = SignalController::new(Instant::now());
    let shared: SharedFrame = Arc::new(Mutex::new(None));

    let server = spawn_server(shared.clone(), controller.clone(), config.port)?;
    info!(
        "viewer at http://127.0.0.1:{}/ (stream: /video_feed, status: /traffic_status)",
        config.port
    );

    let shutdown = install_shutdown_handler();
    let options = PipelineOptions {
        jpeg_quality: config.jpeg_quality,
        verbose: config.verbose,
    };
    let result = run_pipeline(
        &mut source,
        &mut detector,
        &controller,
        &shared,
        &shutdown,
        &options,
    );

    server.stop();
    result
}

#[cfg(not(all(feature = "camera", feature = "with-tch")))]
fn serve(_config: Config) -> Result<()> {
    anyhow::bail!(
        "this build has no capture/inference support; rebuild with `--features camera,with-tch`"
    )
}
