//! Core traits for the transport seam.

use async_trait::async_trait;
use thiserror::Error;

use crate::Endpoint;

/// Close code sent when the client tears down its own transport.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer vanished without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Connection closed")]
    Disconnected,
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Event delivered by a live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete binary frame.
    Frame(Vec<u8>),
    /// Control ping from the peer.
    Ping(Vec<u8>),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
    /// The connection failed.
    Error(String),
}

/// A single live, message-oriented connection.
///
/// Owned by exactly one session; events are consumed one at a time.
#[async_trait]
pub trait Transport: Send {
    /// Write one binary frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next event.
    ///
    /// Once the connection is gone this keeps returning `Closed` or `Error`.
    async fn recv(&mut self) -> TransportEvent;

    /// Answer a ping immediately.
    async fn pong(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self, code: u16, reason: &str);
}

/// Factory for transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to the endpoint.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError>;
}
