//! Connection and session abstraction over the collector link
//!
//! A [`Connector`] opens [`Connection`]s. Each connection hands out one
//! [`Session`] to the streaming loop (the only writer) while the supervisor
//! keeps the connection itself to watch for close/error events.

use crate::error::Result;
use std::fmt;

/// The streaming side of one live connection.
///
/// A session writes exactly one message per [`send`](Session::send) call,
/// synchronously: when `send` returns `Ok` the frame has been handed to the
/// socket. There is no buffering and no retry.
pub trait Session: Send {
    /// Whether the underlying socket is still usable.
    ///
    /// Must turn false once the transport has dropped, not merely when the
    /// session object is gone.
    fn is_live(&self) -> bool;

    /// Write one text payload
    fn send(&mut self, payload: &str) -> Result<()>;
}

/// Connection-level events observed by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Peer closed the connection, with the close reason if one was given
    Closed(Option<String>),
    /// Transport error
    Failed(String),
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Closed(Some(reason)) => write!(f, "closed by peer ({})", reason),
            ConnectionEvent::Closed(None) => write!(f, "closed by peer"),
            ConnectionEvent::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// One open connection to the collector
pub trait Connection {
    type Session: Session + 'static;

    /// Session bound to this connection for the streaming loop
    fn session(&self) -> Self::Session;

    /// Wait (bounded) for a close or error event.
    ///
    /// Returns `None` when nothing happened within the poll interval. Inbound
    /// application messages are consumed and discarded.
    fn poll_event(&mut self) -> Option<ConnectionEvent>;

    /// Close the connection and mark its session not-live
    fn close(&mut self);
}

/// Opens connections to one fixed endpoint
pub trait Connector {
    type Connection: Connection;

    fn connect(&mut self) -> Result<Self::Connection>;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;
}

pub mod mock {
    //! In-memory connections for unit and integration tests

    use super::{Connection, ConnectionEvent, Connector, Session};
    use crate::error::{Error, Result};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct MockSessionInner {
        sent: Vec<(Instant, String)>,
        /// Fail the send with this (1-based) index
        fail_on_send: Option<usize>,
        /// Drop the link after this many successful sends
        drop_after: Option<usize>,
        attempts: usize,
    }

    /// Recording session; clones share state so tests can inspect it
    #[derive(Clone)]
    pub struct MockSession {
        inner: Arc<Mutex<MockSessionInner>>,
        live: Arc<AtomicBool>,
        send_latency: Duration,
    }

    impl MockSession {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(MockSessionInner {
                    sent: Vec::new(),
                    fail_on_send: None,
                    drop_after: None,
                    attempts: 0,
                })),
                live: Arc::new(AtomicBool::new(true)),
                send_latency: Duration::ZERO,
            }
        }

        /// Session whose transport is already gone
        pub fn dead() -> Self {
            let session = Self::new();
            session.set_live(false);
            session
        }

        /// Every send blocks for `latency` before completing
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.send_latency = latency;
            self
        }

        /// Make the n-th send attempt (1-based) fail and drop the link
        pub fn fail_on_send(&self, n: usize) {
            self.inner.lock().fail_on_send = Some(n);
        }

        /// Drop the link once `n` sends have succeeded
        pub fn drop_after(&self, n: usize) {
            self.inner.lock().drop_after = Some(n);
        }

        /// Simulate the transport dropping (or recovering)
        pub fn set_live(&self, live: bool) {
            self.live.store(live, Ordering::SeqCst);
        }

        /// All successfully sent payloads
        pub fn sent(&self) -> Vec<String> {
            self.inner.lock().sent.iter().map(|(_, p)| p.clone()).collect()
        }

        /// Completion time of every successful send
        pub fn send_times(&self) -> Vec<Instant> {
            self.inner.lock().sent.iter().map(|(t, _)| *t).collect()
        }

        /// Send attempts including failed ones
        pub fn attempts(&self) -> usize {
            self.inner.lock().attempts
        }
    }

    impl Default for MockSession {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Session for MockSession {
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn send(&mut self, payload: &str) -> Result<()> {
            if !self.send_latency.is_zero() {
                thread::sleep(self.send_latency);
            }

            let mut inner = self.inner.lock();
            inner.attempts += 1;
            if !self.live.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed);
            }
            if inner.fail_on_send == Some(inner.attempts) {
                self.live.store(false, Ordering::SeqCst);
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "simulated send failure",
                )));
            }
            inner.sent.push((Instant::now(), payload.to_string()));
            if inner.drop_after == Some(inner.sent.len()) {
                self.live.store(false, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    /// Connection wrapping a [`MockSession`].
    ///
    /// Reports `Closed` once the session has gone not-live, the way a real
    /// socket surfaces a dropped link to its reader.
    pub struct MockConnection {
        session: MockSession,
        poll_interval: Duration,
        closed: bool,
    }

    impl MockConnection {
        pub fn new(session: MockSession) -> Self {
            Self {
                session,
                poll_interval: Duration::from_millis(5),
                closed: false,
            }
        }
    }

    impl Connection for MockConnection {
        type Session = MockSession;

        fn session(&self) -> MockSession {
            self.session.clone()
        }

        fn poll_event(&mut self) -> Option<ConnectionEvent> {
            if !self.closed && !self.session.is_live() {
                self.closed = true;
                return Some(ConnectionEvent::Closed(None));
            }
            thread::sleep(self.poll_interval);
            None
        }

        fn close(&mut self) {
            self.closed = true;
            self.session.set_live(false);
        }
    }

    /// Outcome of one scripted connect attempt
    pub enum ConnectOutcome {
        Refuse,
        Accept(MockSession),
    }

    /// Connector that replays a script of outcomes.
    ///
    /// When the script runs out it clears `running` (standing in for an
    /// operator's Ctrl-C) and refuses.
    pub struct ScriptedConnector {
        script: VecDeque<ConnectOutcome>,
        attempts: Arc<Mutex<Vec<Instant>>>,
        running: Arc<AtomicBool>,
    }

    impl ScriptedConnector {
        pub fn new(script: Vec<ConnectOutcome>, running: Arc<AtomicBool>) -> Self {
            Self {
                script: script.into(),
                attempts: Arc::new(Mutex::new(Vec::new())),
                running,
            }
        }

        /// Shared log of connect attempt times
        pub fn attempt_log(&self) -> Arc<Mutex<Vec<Instant>>> {
            Arc::clone(&self.attempts)
        }
    }

    impl Connector for ScriptedConnector {
        type Connection = MockConnection;

        fn connect(&mut self) -> Result<MockConnection> {
            self.attempts.lock().push(Instant::now());
            match self.script.pop_front() {
                Some(ConnectOutcome::Accept(session)) => Ok(MockConnection::new(session)),
                Some(ConnectOutcome::Refuse) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted refusal",
                ))),
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    Err(Error::Other("connect script exhausted".to_string()))
                }
            }
        }

        fn endpoint(&self) -> &str {
            "mock://collector"
        }
    }

}
