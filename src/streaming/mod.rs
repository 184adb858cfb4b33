//! Collector streaming for AasanaIO

pub mod packets;
pub mod session;
pub mod stream_loop;
pub mod websocket;

pub use packets::{OccupancyPacket, PressurePacket};
pub use session::{Connection, ConnectionEvent, Connector, Session};
pub use stream_loop::{LoopReport, StopReason, StreamingLoop};
pub use websocket::{WebSocketConnection, WebSocketConnector, WebSocketSession};
