//! Actix Web viewer exposing the annotated stream and the signal status.
//!
//! The server runs on a dedicated thread so the pipeline hot path never
//! touches the Actix runtime. Handlers only ever take one mutex read per
//! request; they never block on the pipeline loop itself.

use std::time::Duration;

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use tokio::sync::oneshot;
use tracing::error;

use crate::{
    controller::SignalController,
    data::{FramePacket, SharedFrame, StatusResponse},
    html, telemetry,
};

/// Shared state backing HTTP handlers.
struct ServerState {
    latest: SharedFrame,
    controller: SignalController,
}

/// Handle for the viewer server thread.
pub struct SignalServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SignalServer {
    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the viewer server thread and return a handle that can stop it.
pub fn spawn_server(
    latest: SharedFrame,
    controller: SignalController,
    port: u16,
) -> Result<SignalServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("signal-http", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ServerState {
                        latest: latest.clone(),
                        controller: controller.clone(),
                    }))
                    .route("/", web::get().to(index_route))
                    .route("/video_feed", web::get().to(video_feed_handler))
                    .route("/traffic_status", web::get().to(traffic_status_handler))
                    .route("/frame.jpg", web::get().to(frame_handler))
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .bind(("0.0.0.0", port))?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn viewer server thread")?;

    Ok(SignalServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Fetch the latest encoded frame from the shared pointer.
fn latest_frame(shared: &SharedFrame) -> Option<FramePacket> {
    match shared.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => None,
    }
}

/// Serve the embedded viewer page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html::INDEX_HTML)
}

/// Stream the annotated feed over a multipart response.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.clone();
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(Duration::from_millis(33));
        loop {
            interval.tick().await;
            if let Some(packet) = latest_frame(&state.latest) {
                let mut payload = Vec::with_capacity(packet.jpeg.len() + 64);
                payload.extend_from_slice(b"--frame\r\n");
                payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
                payload.extend_from_slice(&packet.jpeg);
                payload.extend_from_slice(b"\r\n");
                yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

/// Return the current signal and vehicle count as JSON.
async fn traffic_status_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.controller.snapshot() {
        Ok(snapshot) => HttpResponse::Ok().json(StatusResponse::from(snapshot)),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

/// Return the single latest JPEG frame.
async fn frame_handler(state: web::Data<ServerState>) -> HttpResponse {
    match latest_frame(&state.latest) {
        Some(packet) => HttpResponse::Ok()
            .content_type("image/jpeg")
            .body(packet.jpeg),
        None => HttpResponse::NoContent().finish(),
    }
}

/// Prometheus exposition of the pipeline metrics.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use actix_web::{App, test, web};

    use super::*;
    use crate::data::TrafficState;

    fn test_state(latest: SharedFrame, controller: SignalController) -> web::Data<ServerState> {
        web::Data::new(ServerState { latest, controller })
    }

    #[actix_web::test]
    async fn traffic_status_reports_the_committed_snapshot() {
        let controller = SignalController::new(Instant::now());
        controller
            .tick(12, Instant::now() + Duration::from_secs(15))
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(test_state(Arc::new(Mutex::new(None)), controller))
                .route("/traffic_status", web::get().to(traffic_status_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/traffic_status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["traffic_light"], "green");
        assert_eq!(body["vehicle_count"], 12);
    }

    #[actix_web::test]
    async fn frame_route_returns_no_content_before_the_first_frame() {
        let controller = SignalController::new(Instant::now());
        let app = test::init_service(
            App::new()
                .app_data(test_state(Arc::new(Mutex::new(None)), controller))
                .route("/frame.jpg", web::get().to(frame_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/frame.jpg").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn frame_route_serves_the_latest_jpeg() {
        let controller = SignalController::new(Instant::now());
        let snapshot = TrafficState {
            signal: crate::data::SignalPhase::Red,
            timer: Duration::from_secs(15),
            last_change: Instant::now(),
            vehicle_count: 0,
        };
        let latest: SharedFrame = Arc::new(Mutex::new(Some(FramePacket {
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            state: snapshot,
            frame_number: 1,
            fps: 0.0,
            timestamp_ms: 0,
        })));

        let app = test::init_service(
            App::new()
                .app_data(test_state(latest, controller))
                .route("/frame.jpg", web::get().to(frame_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/frame.jpg").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..2], &[0xFF, 0xD8]);
    }
}
