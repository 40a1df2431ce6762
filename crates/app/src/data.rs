use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::Serialize;

/// Signal phase shown to drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalPhase {
    Red,
    Yellow,
    Green,
}

impl SignalPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalPhase::Red => "red",
            SignalPhase::Yellow => "yellow",
            SignalPhase::Green => "green",
        }
    }
}

/// The one long-lived traffic record. Created once at startup, mutated only
/// by the controller's tick, read concurrently through snapshots.
#[derive(Clone, Copy, Debug)]
pub struct TrafficState {
    pub signal: SignalPhase,
    /// How long the current phase must hold before it may transition. Always
    /// positive.
    pub timer: Duration,
    /// Start of the current phase (reset on every transition, including the
    /// red self-loop).
    pub last_change: Instant,
    /// Most recent tick's vehicle count.
    pub vehicle_count: u32,
}

/// Annotated frame plus the snapshot it was rendered from.
#[derive(Clone)]
pub struct FramePacket {
    pub jpeg: Vec<u8>,
    pub state: TrafficState,
    pub frame_number: u64,
    pub fps: f32,
    pub timestamp_ms: i64,
}

/// Latest encoded frame shared between the pipeline writer and HTTP readers.
pub type SharedFrame = Arc<Mutex<Option<FramePacket>>>;

/// Payload for `GET /traffic_status`.
#[derive(Serialize)]
pub struct StatusResponse {
    pub traffic_light: &'static str,
    pub vehicle_count: u32,
}

impl From<TrafficState> for StatusResponse {
    fn from(state: TrafficState) -> Self {
        Self {
            traffic_light: state.signal.as_str(),
            vehicle_count: state.vehicle_count,
        }
    }
}
