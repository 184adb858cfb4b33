//! Connection supervisor
//!
//! Keeps the device talking to the collector for as long as the process
//! runs:
//!
//! ```text
//!        ┌──────────────┐  connect ok   ┌────────────┐
//!   ┌───▶│  CONNECTING  │──────────────▶│ CONNECTED  │── spawn stream-loop-<gen>
//!   │    └──────┬───────┘               └─────┬──────┘
//!   │           │ connect failed              │ close/error event, or loop stopped
//!   │           ▼                             ▼
//!   │    ┌──────────────────────────────────────────┐
//!   └────│ DISCONNECTED (wait reconnect_delay)      │
//!        └──────────────────────────────────────────┘
//! ```
//!
//! Retry is unconditional and unbounded with a constant delay: no backoff
//! growth, no retry limit, no circuit breaker. Only clearing `running`
//! (Ctrl-C / SIGTERM) ends the outer loop.
//!
//! At most one streaming loop exists at a time: before leaving CONNECTED the
//! supervisor closes the connection and joins the loop thread. Every loop is
//! tagged with the generation of the connection it is bound to.

use crate::acquisition::SensorAcquisition;
use crate::config::{CollectorConfig, StreamingConfig};
use crate::processing::ReadingProcessor;
use crate::streaming::session::{Connection, Connector};
use crate::streaming::stream_loop::{LoopReport, StreamingLoop};
use crossbeam_channel::TryRecvError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting to reconnect
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// How long shutdown waits for the streaming loop before closing under it
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Disconnected => "DISCONNECTED",
            SupervisorState::Connecting => "CONNECTING",
            SupervisorState::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// Totals over the supervisor's lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisorStats {
    /// Successful connects (= highest generation)
    pub connections: u64,
    pub failed_attempts: u64,
    pub cycles: u64,
    pub packets_sent: u64,
    /// One report per finished streaming loop, oldest first
    pub loops: Vec<LoopReport>,
}

pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    acquisition: Arc<Mutex<SensorAcquisition>>,
    processor: ReadingProcessor,
    streaming: StreamingConfig,
    reconnect_delay: Duration,
    running: Arc<AtomicBool>,
    state: SupervisorState,
    generation: u64,
    stats: SupervisorStats,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(
        connector: C,
        acquisition: SensorAcquisition,
        processor: ReadingProcessor,
        streaming: StreamingConfig,
        collector: &CollectorConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connector,
            acquisition: Arc::new(Mutex::new(acquisition)),
            processor,
            streaming,
            reconnect_delay: collector.reconnect_delay(),
            running,
            state: SupervisorState::Disconnected,
            generation: 0,
            stats: SupervisorStats::default(),
        }
    }

    /// Run until `running` is cleared
    pub fn run(mut self) -> SupervisorStats {
        log::info!(
            "Supervisor started (collector {}, reconnect every {:?})",
            self.connector.endpoint(),
            self.reconnect_delay
        );

        while self.is_running() {
            self.transition(SupervisorState::Connecting);
            match self.connector.connect() {
                Ok(connection) => {
                    self.generation += 1;
                    self.stats.connections += 1;
                    self.transition(SupervisorState::Connected);
                    log::info!(
                        "[gen {}] Connected to {}",
                        self.generation,
                        self.connector.endpoint()
                    );
                    self.serve(connection);
                }
                Err(e) => {
                    self.stats.failed_attempts += 1;
                    log::warn!("Connect to {} failed: {}", self.connector.endpoint(), e);
                }
            }

            self.transition(SupervisorState::Disconnected);
            if !self.is_running() {
                break;
            }
            log::info!("Reconnecting in {:?}", self.reconnect_delay);
            self.wait(self.reconnect_delay);
        }

        log::info!(
            "Supervisor stopped: {} connections, {} failed attempts, {} cycles, {} packets",
            self.stats.connections,
            self.stats.failed_attempts,
            self.stats.cycles,
            self.stats.packets_sent
        );
        for (key, failures) in self.acquisition.lock().channel_failures() {
            log::warn!(
                "Pressure channel {} still failing at shutdown ({} reads in a row)",
                key,
                failures
            );
        }
        self.stats
    }

    /// CONNECTED: run one streaming loop and watch the connection until
    /// either side ends it
    fn serve(&mut self, mut connection: C::Connection) {
        let generation = self.generation;
        let stream_loop = StreamingLoop::new(
            connection.session(),
            Arc::clone(&self.acquisition),
            self.processor,
            &self.streaming,
            Arc::clone(&self.running),
            generation,
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded::<LoopReport>(1);
        let spawned = thread::Builder::new()
            .name(format!("stream-loop-{}", generation))
            .spawn(move || {
                let report = stream_loop.run();
                let _ = done_tx.send(report);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("[gen {}] Failed to spawn streaming loop: {}", generation, e);
                connection.close();
                return;
            }
        };

        let mut report = None;
        while self.is_running() {
            if let Some(event) = connection.poll_event() {
                log::warn!("[gen {}] Connection {}", generation, event);
                break;
            }
            match done_rx.try_recv() {
                Ok(r) => {
                    report = Some(r);
                    break;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
        }

        // On shutdown let the loop finish its current cycle and see the flag
        // itself before the link goes away under it
        if report.is_none() && !self.is_running() {
            report = done_rx.recv_timeout(SHUTDOWN_GRACE).ok();
        }

        // Marks the session not-live; the loop notices within one sleep slice
        connection.close();
        if report.is_none() {
            report = done_rx.recv().ok();
        }
        if handle.join().is_err() {
            log::error!("[gen {}] Streaming loop thread panicked", generation);
        }

        if let Some(report) = report {
            self.stats.cycles += report.cycles;
            self.stats.packets_sent += report.packets_sent;
            self.stats.loops.push(report);
        }
    }

    /// Interruptible sleep; returns early on shutdown
    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            log::debug!("Supervisor {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
