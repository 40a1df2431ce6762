//! Time-driven signal state machine.
//!
//! The controller owns the authoritative [`TrafficState`]. Exactly one writer
//! (the pipeline loop) calls [`SignalController::tick`]; any number of
//! readers may call [`SignalController::snapshot`] concurrently. A mutex
//! around the record keeps reads consistent with the last committed tick.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::data::{SignalPhase, TrafficState};

pub const RED_HOLD: Duration = Duration::from_secs(15);
pub const GREEN_HOLD: Duration = Duration::from_secs(15);
pub const YELLOW_AFTER_GREEN: Duration = Duration::from_secs(4);
pub const YELLOW_AFTER_RED: Duration = Duration::from_secs(10);

/// Red clears straight to green at this count.
pub const GREEN_THRESHOLD: u32 = 10;
/// Red steps to a short yellow at this count.
pub const YELLOW_THRESHOLD: u32 = 5;

/// Broken single-writer discipline; fatal to the pipeline loop.
#[derive(Debug, Error)]
#[error("traffic state invariant violated: {0}")]
pub struct InvariantViolation(pub &'static str);

#[derive(Clone)]
pub struct SignalController {
    state: Arc<Mutex<TrafficState>>,
}

impl SignalController {
    /// Start in red with a full hold timer at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrafficState {
                signal: SignalPhase::Red,
                timer: RED_HOLD,
                last_change: now,
                vehicle_count: 0,
            })),
        }
    }

    /// Advance the state machine by one observation.
    ///
    /// The vehicle count always reflects the current tick, timer elapsed or
    /// not. A transition is taken only once `now - last_change >= timer`;
    /// every taken transition (the red self-loop included) restarts the
    /// timer at `now`. Returns the committed snapshot.
    pub fn tick(&self, vehicle_count: u32, now: Instant) -> Result<TrafficState, InvariantViolation> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| InvariantViolation("state lock poisoned"))?;

        state.vehicle_count = vehicle_count;

        if now.duration_since(state.last_change) >= state.timer {
            let (signal, timer) = match state.signal {
                SignalPhase::Red if vehicle_count >= GREEN_THRESHOLD => {
                    (SignalPhase::Green, GREEN_HOLD)
                }
                SignalPhase::Red if vehicle_count >= YELLOW_THRESHOLD => {
                    (SignalPhase::Yellow, YELLOW_AFTER_RED)
                }
                SignalPhase::Red => (SignalPhase::Red, RED_HOLD),
                SignalPhase::Green => (SignalPhase::Yellow, YELLOW_AFTER_GREEN),
                SignalPhase::Yellow => (SignalPhase::Red, RED_HOLD),
            };
            state.signal = signal;
            state.timer = timer;
            state.last_change = now;
        }

        Ok(*state)
    }

    /// Read-only copy of the last committed state; safe from any thread.
    pub fn snapshot(&self) -> Result<TrafficState, InvariantViolation> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|_| InvariantViolation("state lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn start() -> (SignalController, Instant) {
        let t0 = Instant::now();
        (SignalController::new(t0), t0)
    }

    #[test]
    fn starts_red_with_full_timer() {
        let (controller, t0) = start();
        let state = controller.snapshot().unwrap();
        assert_eq!(state.signal, SignalPhase::Red);
        assert_eq!(state.timer, RED_HOLD);
        assert_eq!(state.last_change, t0);
        assert_eq!(state.vehicle_count, 0);
    }

    #[test]
    fn held_phase_still_updates_vehicle_count() {
        let (controller, t0) = start();
        let state = controller.tick(7, t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(state.signal, SignalPhase::Red);
        assert_eq!(state.timer, RED_HOLD);
        assert_eq!(state.last_change, t0);
        assert_eq!(state.vehicle_count, 7);
    }

    #[test]
    fn red_clears_to_green_at_inclusive_threshold() {
        let (controller, t0) = start();
        let state = controller.tick(10, t0 + RED_HOLD).unwrap();
        assert_eq!(state.signal, SignalPhase::Green);
        assert_eq!(state.timer, GREEN_HOLD);
        assert_eq!(state.last_change, t0 + RED_HOLD);
    }

    #[test]
    fn red_steps_to_short_yellow_at_inclusive_threshold() {
        for count in [5, 9] {
            let t0 = Instant::now();
            let controller = SignalController::new(t0);
            let state = controller.tick(count, t0 + RED_HOLD).unwrap();
            assert_eq!(state.signal, SignalPhase::Yellow, "count {count}");
            assert_eq!(state.timer, YELLOW_AFTER_RED);
        }
    }

    #[test]
    fn quiet_red_self_loops_and_resets_timer() {
        let (controller, t0) = start();
        let state = controller.tick(4, t0 + RED_HOLD).unwrap();
        assert_eq!(state.signal, SignalPhase::Red);
        assert_eq!(state.timer, RED_HOLD);
        // The self-loop counts as a transition: the timer restarts.
        assert_eq!(state.last_change, t0 + RED_HOLD);
    }

    #[test]
    fn green_always_yields_short_yellow() {
        for count in [0, 50] {
            let t0 = Instant::now();
            let controller = SignalController::new(t0);
            controller.tick(12, t0 + RED_HOLD).unwrap();
            let state = controller
                .tick(count, t0 + RED_HOLD + GREEN_HOLD)
                .unwrap();
            assert_eq!(state.signal, SignalPhase::Yellow, "count {count}");
            assert_eq!(state.timer, YELLOW_AFTER_GREEN);
        }
    }

    #[test]
    fn yellow_always_returns_to_red() {
        for count in [0, 50] {
            let t0 = Instant::now();
            let controller = SignalController::new(t0);
            controller.tick(7, t0 + RED_HOLD).unwrap();
            let state = controller
                .tick(count, t0 + RED_HOLD + YELLOW_AFTER_RED)
                .unwrap();
            assert_eq!(state.signal, SignalPhase::Red, "count {count}");
            assert_eq!(state.timer, RED_HOLD);
        }
    }

    #[test]
    fn snapshot_never_mutates() {
        let (controller, t0) = start();
        controller.tick(8, t0 + Duration::from_secs(1)).unwrap();
        let first = controller.snapshot().unwrap();
        for _ in 0..100 {
            let again = controller.snapshot().unwrap();
            assert_eq!(again.signal, first.signal);
            assert_eq!(again.timer, first.timer);
            assert_eq!(again.last_change, first.last_change);
            assert_eq!(again.vehicle_count, first.vehicle_count);
        }
    }

    #[test]
    fn full_cycle_scenario() {
        let (controller, t0) = start();

        let s = controller.tick(12, t0 + Duration::from_secs(15)).unwrap();
        assert_eq!(s.signal, SignalPhase::Green);
        assert_eq!(s.timer, GREEN_HOLD);
        assert_eq!(s.last_change, t0 + Duration::from_secs(15));
        assert_eq!(s.vehicle_count, 12);

        let s = controller.tick(3, t0 + Duration::from_secs(30)).unwrap();
        assert_eq!(s.signal, SignalPhase::Yellow);
        assert_eq!(s.timer, YELLOW_AFTER_GREEN);
        assert_eq!(s.last_change, t0 + Duration::from_secs(30));
        assert_eq!(s.vehicle_count, 3);

        let s = controller.tick(0, t0 + Duration::from_secs(34)).unwrap();
        assert_eq!(s.signal, SignalPhase::Red);
        assert_eq!(s.timer, RED_HOLD);
        assert_eq!(s.last_change, t0 + Duration::from_secs(34));
        assert_eq!(s.vehicle_count, 0);

        let s = controller.tick(2, t0 + Duration::from_secs(49)).unwrap();
        assert_eq!(s.signal, SignalPhase::Red);
        assert_eq!(s.timer, RED_HOLD);
        assert_eq!(s.last_change, t0 + Duration::from_secs(49));
        assert_eq!(s.vehicle_count, 2);
    }

    #[test]
    fn concurrent_snapshots_see_committed_states_only() {
        let (controller, t0) = start();
        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader = controller.clone();
            readers.push(thread::spawn(move || {
                for _ in 0..1_000 {
                    let state = reader.snapshot().unwrap();
                    // A committed record always pairs the phase with its own
                    // hold duration.
                    let expected = match state.signal {
                        SignalPhase::Red => state.timer == RED_HOLD,
                        SignalPhase::Green => state.timer == GREEN_HOLD,
                        SignalPhase::Yellow => {
                            state.timer == YELLOW_AFTER_GREEN || state.timer == YELLOW_AFTER_RED
                        }
                    };
                    assert!(expected, "torn read: {:?}", state);
                }
            }));
        }

        let mut now = t0;
        for count in 0..1_000u32 {
            now += Duration::from_secs(1);
            controller.tick(count % 15, now).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
