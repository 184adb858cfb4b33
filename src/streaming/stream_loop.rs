//! Per-connection streaming loop
//!
//! One loop instance runs on its own thread for the lifetime of one
//! connection:
//!
//! ```text
//! ACQUIRE → BUILD → CHECK_LIVE → SEND_OCCUPANCY → DELAY → SEND_PRESSURE → SLEEP ─┐
//!    ▲                  │              │                        │                 │
//!    │                  └──────────────┴────────► STOPPED ◀─────┘                 │
//!    └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cycle starts are `cycle_interval` apart regardless of how long the cycle
//! itself took. The loop never reconnects: on any fault it logs, returns a
//! [`LoopReport`], and leaves recovery to the supervisor.

use crate::acquisition::SensorAcquisition;
use crate::config::StreamingConfig;
use crate::error::Result;
use crate::processing::ReadingProcessor;
use crate::streaming::packets;
use crate::streaming::session::Session;
use chrono::Utc;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting for the next cycle
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Why a streaming loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// Session reported not-live at cycle start
    NotLive,
    /// A send failed
    SendFailed(String),
    /// Acquisition or packet building failed
    Fault(String),
    /// Process is shutting down
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NotLive => write!(f, "connection lost"),
            StopReason::SendFailed(e) => write!(f, "send failed: {}", e),
            StopReason::Fault(e) => write!(f, "cycle fault: {}", e),
            StopReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Summary returned when a loop exits
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    pub generation: u64,
    /// Fully completed cycles (both packets sent)
    pub cycles: u64,
    pub packets_sent: u64,
    pub reason: StopReason,
}

/// Streaming loop bound to one session
pub struct StreamingLoop<S: Session> {
    session: S,
    acquisition: Arc<Mutex<SensorAcquisition>>,
    processor: ReadingProcessor,
    cycle_interval: Duration,
    inter_send_delay: Duration,
    running: Arc<AtomicBool>,
    generation: u64,
}

impl<S: Session> StreamingLoop<S> {
    pub fn new(
        session: S,
        acquisition: Arc<Mutex<SensorAcquisition>>,
        processor: ReadingProcessor,
        streaming: &StreamingConfig,
        running: Arc<AtomicBool>,
        generation: u64,
    ) -> Self {
        Self {
            session,
            acquisition,
            processor,
            cycle_interval: streaming.cycle_interval(),
            inter_send_delay: streaming.inter_send_delay(),
            running,
            generation,
        }
    }

    /// Run cycles until the session drops, a send fails, or shutdown
    pub fn run(mut self) -> LoopReport {
        log::info!("[gen {}] Streaming loop started", self.generation);

        let mut cycles = 0u64;
        let mut packets_sent = 0u64;

        let reason = loop {
            if !self.running.load(Ordering::Relaxed) {
                break StopReason::Shutdown;
            }
            let cycle_start = Instant::now();

            // ACQUIRE + BUILD. A panic in a sensor backend is a fault of this
            // loop, not of the process.
            let built = panic::catch_unwind(AssertUnwindSafe(|| self.acquire_and_build()));
            let (occupancy, pressure) = match built {
                Ok(Ok(payloads)) => payloads,
                Ok(Err(e)) => break StopReason::Fault(e.to_string()),
                Err(panic) => break StopReason::Fault(panic_message(panic)),
            };

            // CHECK_LIVE
            if !self.session.is_live() {
                break StopReason::NotLive;
            }

            // SEND_OCCUPANCY
            if let Err(e) = self.session.send(&occupancy) {
                break StopReason::SendFailed(e.to_string());
            }
            packets_sent += 1;
            log::debug!("[gen {}] Sent occupancy: {}", self.generation, occupancy);

            // DELAY, keeps the two messages from arriving back-to-back
            thread::sleep(self.inter_send_delay);

            // SEND_PRESSURE
            if let Err(e) = self.session.send(&pressure) {
                break StopReason::SendFailed(e.to_string());
            }
            packets_sent += 1;
            log::debug!("[gen {}] Sent pressure: {}", self.generation, pressure);

            cycles += 1;

            // SLEEP
            if !self.sleep_until(cycle_start + self.cycle_interval) {
                break StopReason::Shutdown;
            }
        };

        match &reason {
            StopReason::Shutdown => log::info!(
                "[gen {}] Streaming loop stopped: {} ({} cycles, {} packets)",
                self.generation,
                reason,
                cycles,
                packets_sent
            ),
            _ => log::warn!(
                "[gen {}] Streaming loop stopped: {} ({} cycles, {} packets)",
                self.generation,
                reason,
                cycles,
                packets_sent
            ),
        }

        LoopReport {
            generation: self.generation,
            cycles,
            packets_sent,
            reason,
        }
    }

    /// Read fresh hardware state and serialize both packets of this cycle
    fn acquire_and_build(&self) -> Result<(String, String)> {
        let (raw, distance) = {
            let mut acquisition = self.acquisition.lock();
            let raw = acquisition.read_pressure_channels();
            let distance = acquisition.read_distance();
            (raw, distance)
        };

        let reading = self.processor.process(raw);
        let is_seated = self.processor.is_occupied(distance);
        log::trace!(
            "[gen {}] raw={:?} distance={:?} seated={}",
            self.generation,
            raw,
            distance,
            is_seated
        );

        let (occupancy, pressure) = packets::build(Utc::now(), reading, is_seated);
        Ok((occupancy.to_json()?, pressure.to_json()?))
    }

    /// Sleep until `deadline` in short slices.
    ///
    /// Returns false on shutdown. Returns early (true) when the session goes
    /// not-live so the next cycle's liveness check can stop the loop.
    fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline || !self.session.is_live() {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::core::sensor::{AnalogInput, RangeSensor};
    use crate::devices::mock::{fixed_handles, FixedRanger};
    use crate::streaming::packets::{OccupancyPacket, PressurePacket};
    use crate::streaming::session::mock::MockSession;

    fn fast_config() -> StreamingConfig {
        StreamingConfig {
            cycle_interval_ms: 40,
            inter_send_delay_ms: 5,
        }
    }

    fn acquisition(
        counts: [u16; 8],
        ranger: Option<Box<dyn RangeSensor>>,
    ) -> Arc<Mutex<SensorAcquisition>> {
        Arc::new(Mutex::new(
            SensorAcquisition::new(fixed_handles(counts, ranger), 2.0).unwrap(),
        ))
    }

    fn run_loop(
        session: &MockSession,
        acq: Arc<Mutex<SensorAcquisition>>,
        config: &StreamingConfig,
    ) -> LoopReport {
        let running = Arc::new(AtomicBool::new(true));
        StreamingLoop::new(
            session.clone(),
            acq,
            ReadingProcessor::default(),
            config,
            running,
            1,
        )
        .run()
    }

    #[test]
    fn test_cycle_emits_occupancy_then_pressure() {
        let session = MockSession::new();
        session.drop_after(2);
        let acq = acquisition(
            [5, 25, 0, 1023, 19, 20, 300, 7],
            Some(Box::new(FixedRanger::meters(0.18))),
        );

        let report = run_loop(&session, acq, &fast_config());
        assert_eq!(report.reason, StopReason::NotLive);
        assert_eq!(report.cycles, 1);
        assert_eq!(report.packets_sent, 2);

        let sent = session.sent();
        let occupancy: OccupancyPacket = serde_json::from_str(&sent[0]).unwrap();
        let pressure: PressurePacket = serde_json::from_str(&sent[1]).unwrap();
        assert!(occupancy.is_seated);
        assert_eq!(occupancy.detected_at, pressure.timestamp);
        assert_eq!(pressure.sensors.to_channels(), [0, 25, 0, 1023, 0, 20, 300, 0]);
    }

    #[test]
    fn test_far_distance_is_not_seated() {
        let session = MockSession::new();
        session.drop_after(2);
        let acq = acquisition([0; 8], Some(Box::new(FixedRanger::meters(0.25))));

        run_loop(&session, acq, &fast_config());
        let occupancy: OccupancyPacket = serde_json::from_str(&session.sent()[0]).unwrap();
        assert!(!occupancy.is_seated);
    }

    #[test]
    fn test_missing_ranger_streams_not_seated() {
        let session = MockSession::new();
        session.drop_after(4);
        let acq = acquisition([0; 8], None);

        let report = run_loop(&session, acq, &fast_config());
        assert_eq!(report.reason, StopReason::NotLive);
        assert_eq!(report.cycles, 2);
        for payload in session.sent().iter().step_by(2) {
            let occupancy: OccupancyPacket = serde_json::from_str(payload).unwrap();
            assert!(!occupancy.is_seated);
        }
    }

    #[test]
    fn test_occupancy_send_failure_skips_pressure() {
        let session = MockSession::new();
        session.fail_on_send(1);
        let acq = acquisition([100; 8], None);

        let report = run_loop(&session, acq, &fast_config());
        assert!(matches!(report.reason, StopReason::SendFailed(_)));
        assert_eq!(report.packets_sent, 0);
        assert_eq!(report.cycles, 0);
        assert_eq!(session.attempts(), 1);
        assert!(session.sent().is_empty());
    }

    #[test]
    fn test_pressure_send_failure_stops_loop() {
        let session = MockSession::new();
        session.fail_on_send(2);
        let acq = acquisition([100; 8], None);

        let report = run_loop(&session, acq, &fast_config());
        assert!(matches!(report.reason, StopReason::SendFailed(_)));
        assert_eq!(report.packets_sent, 1);
        assert_eq!(session.attempts(), 2);
    }

    #[test]
    fn test_not_live_at_start_sends_nothing() {
        let session = MockSession::dead();
        let acq = acquisition([100; 8], None);

        let report = run_loop(&session, acq, &fast_config());
        assert_eq!(report.reason, StopReason::NotLive);
        assert_eq!(report.cycles, 0);
        assert_eq!(session.attempts(), 0);
    }

    #[test]
    fn test_cadence_is_measured_between_cycle_starts() {
        // 30 + 20 + 30 ms of send work inside a 150 ms cycle
        let session = MockSession::new().with_latency(Duration::from_millis(30));
        session.drop_after(6);
        let acq = acquisition([0; 8], None);
        let config = StreamingConfig {
            cycle_interval_ms: 150,
            inter_send_delay_ms: 20,
        };

        let report = run_loop(&session, acq, &config);
        assert_eq!(report.cycles, 3);

        let times = session.send_times();
        let first_gap = times[2] - times[0];
        let second_gap = times[4] - times[2];
        for gap in [first_gap, second_gap] {
            assert!(gap >= Duration::from_millis(140), "gap {:?} too short", gap);
            assert!(gap < Duration::from_millis(230), "gap {:?} too long", gap);
        }

        // Occupancy and pressure of one cycle are separate, delayed writes
        let inner_gap = times[1] - times[0];
        assert!(inner_gap >= Duration::from_millis(45), "gap {:?}", inner_gap);
    }

    #[test]
    fn test_shutdown_flag_stops_loop() {
        let session = MockSession::new();
        let acq = acquisition([0; 8], None);
        let running = Arc::new(AtomicBool::new(true));
        let config = StreamingConfig {
            cycle_interval_ms: 10_000,
            inter_send_delay_ms: 0,
        };

        let stream_loop = StreamingLoop::new(
            session.clone(),
            acq,
            ReadingProcessor::default(),
            &config,
            Arc::clone(&running),
            3,
        );
        let handle = thread::spawn(move || stream_loop.run());

        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        let report = handle.join().unwrap();

        assert_eq!(report.reason, StopReason::Shutdown);
        assert_eq!(report.generation, 3);
        assert_eq!(report.cycles, 1);
    }

    struct PanickingInput;

    impl AnalogInput for PanickingInput {
        fn read_normalized(&mut self) -> Result<f64> {
            panic!("driver bug");
        }
    }

    #[test]
    fn test_panic_during_acquire_is_contained() {
        let session = MockSession::new();
        let mut handles = fixed_handles([0; 8], None);
        handles.channels[4] = Box::new(PanickingInput);
        let acq = Arc::new(Mutex::new(SensorAcquisition::new(handles, 2.0).unwrap()));

        let report = run_loop(&session, acq, &fast_config());
        assert_eq!(report.reason, StopReason::Fault("panic: driver bug".to_string()));
        assert_eq!(session.attempts(), 0);
    }
}
