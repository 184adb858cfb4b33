//! WebSocket link to the collector (blocking `tungstenite`).
//!
//! # Thread Model
//!
//! ```text
//! ┌──────────────────┐  send (text frames)  ┌──────────────────────┐
//! │ stream-loop-<g>  │─────────┐            │   Supervisor         │
//! │ WebSocketSession │         ▼            │ WebSocketConnection  │
//! └──────────────────┘   Mutex<WebSocket> ◀─│ drain (nonblocking)  │
//!                                ▲          └──────────┬───────────┘
//!                                │ peek (blocking, no lock)
//!                           raw TcpStream ◀────────────┘
//! ```
//!
//! The streaming thread is the only writer of data frames. The supervisor
//! waits for inbound bytes with a `peek` on a second handle of the TCP
//! stream, which never touches the socket lock. Only once bytes are pending
//! does it take the lock, switch the stream to nonblocking and drain every
//! complete frame, so a writer waits at most for one drain. That drain is
//! what surfaces close frames and transport errors, and it also drops
//! whatever the collector sends, such as its periodic heartbeats.

use crate::error::{Error, Result};
use crate::streaming::session::{Connection, ConnectionEvent, Connector, Session};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// State shared by a connection and its session
struct Link {
    socket: Mutex<Socket>,
    /// Second handle on the TCP stream, used to unblock a hung write
    raw: TcpStream,
    live: AtomicBool,
}

impl Link {
    fn mark_dead(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Streaming-side handle of a WebSocket connection
pub struct WebSocketSession {
    link: Arc<Link>,
}

impl Session for WebSocketSession {
    fn is_live(&self) -> bool {
        self.link.live.load(Ordering::SeqCst)
    }

    fn send(&mut self, payload: &str) -> Result<()> {
        if !self.link.live.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let mut socket = self.link.socket.lock();
        // send() = write + flush: the frame is on the wire when this returns
        if let Err(e) = socket.send(Message::Text(payload.to_owned())) {
            self.link.mark_dead();
            return Err(e.into());
        }
        Ok(())
    }
}

/// Supervisor-side handle of a WebSocket connection
pub struct WebSocketConnection {
    link: Arc<Link>,
    poll_interval: Duration,
}

impl Connection for WebSocketConnection {
    type Session = WebSocketSession;

    fn session(&self) -> WebSocketSession {
        WebSocketSession {
            link: Arc::clone(&self.link),
        }
    }

    fn poll_event(&mut self) -> Option<ConnectionEvent> {
        if !self.link.live.load(Ordering::SeqCst) {
            // Already failed on the send side; nothing left to read
            std::thread::sleep(self.poll_interval);
            return Some(ConnectionEvent::Failed("send side reported failure".to_string()));
        }

        // Bounded by the socket read timeout. EOF peeks as Ok(0) and is
        // classified by the drain.
        let mut pending = [0u8; 1];
        match self.link.raw.peek(&mut pending) {
            Ok(_) => self.drain(),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
            Err(e) => {
                self.link.mark_dead();
                Some(ConnectionEvent::Failed(e.to_string()))
            }
        }
    }

    fn close(&mut self) {
        self.link.mark_dead();

        // A session stuck in a write holds the lock; the raw shutdown below
        // makes that write fail so the streaming thread can exit.
        if let Some(mut socket) = self.link.socket.try_lock_for(self.poll_interval) {
            if socket.can_write() {
                let _ = socket.close(None);
                let _ = socket.flush();
            }
        }
        let _ = self.link.raw.shutdown(Shutdown::Both);
    }
}

impl WebSocketConnection {
    /// Read every complete inbound frame without blocking
    fn drain(&mut self) -> Option<ConnectionEvent> {
        let mut socket = self.link.socket.lock();
        if let Err(e) = self.link.raw.set_nonblocking(true) {
            self.link.mark_dead();
            return Some(ConnectionEvent::Failed(e.to_string()));
        }

        let event = loop {
            match socket.read() {
                Ok(Message::Close(frame)) => {
                    break Some(ConnectionEvent::Closed(
                        frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty()),
                    ));
                }
                Ok(Message::Text(text)) => log::trace!("Discarding inbound message: {}", text),
                Ok(_) => {}
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    break None;
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break Some(ConnectionEvent::Closed(None));
                }
                Err(e) => break Some(ConnectionEvent::Failed(e.to_string())),
            }
        };

        // Writes from the streaming thread expect a blocking stream
        if let Err(e) = self.link.raw.set_nonblocking(false) {
            self.link.mark_dead();
            return Some(ConnectionEvent::Failed(e.to_string()));
        }
        if event.is_some() {
            self.link.mark_dead();
        }
        event
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        if self.link.live.load(Ordering::SeqCst) {
            self.close();
        }
    }
}

/// Opens WebSocket connections to the configured collector URL
pub struct WebSocketConnector {
    url: String,
    poll_interval: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            url: url.into(),
            poll_interval,
        }
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    fn connect(&mut self) -> Result<WebSocketConnection> {
        let (socket, response) = tungstenite::connect(self.url.as_str())?;
        log::debug!("Handshake with {} complete ({})", self.url, response.status());

        let raw = match socket.get_ref() {
            MaybeTlsStream::Plain(stream) => {
                stream.set_read_timeout(Some(self.poll_interval))?;
                // Two small frames per cycle; don't let Nagle hold them back
                stream.set_nodelay(true)?;
                stream.try_clone()?
            }
            _ => {
                return Err(Error::Config(format!(
                    "{}: only plain ws:// streams are supported",
                    self.url
                )))
            }
        };

        Ok(WebSocketConnection {
            link: Arc::new(Link {
                socket: Mutex::new(socket),
                raw,
                live: AtomicBool::new(true),
            }),
            poll_interval: self.poll_interval,
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
