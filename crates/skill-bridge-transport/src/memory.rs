//! In-memory transport.
//!
//! Each successful `connect` hands a [`MemoryPeer`] to whoever holds the
//! connector's peer receiver, which then plays the server side.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use skill_bridge_core::{
    Connector, Endpoint, Transport, TransportError, TransportEvent,
    traits::CLOSE_ABNORMAL,
};
use tokio::sync::mpsc;

/// What the client side did, as seen by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSignal {
    Frame(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

/// Connector producing in-memory transports.
#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    stalls: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Create a connector and the receiver of server-side peers.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            refusals: Arc::new(AtomicUsize::new(0)),
            stalls: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (connector, rx)
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Leave the next `n` connection attempts pending forever.
    pub fn stall_next(&self, n: usize) {
        self.stalls.store(n, Ordering::SeqCst);
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.stalls) {
            return std::future::pending().await;
        }

        if take_one(&self.refusals) {
            return Err(TransportError::ConnectionFailed(format!(
                "connection refused: {}",
                endpoint.url()
            )));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();

        self.peers
            .send(MemoryPeer {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::ConnectionFailed("no listener".to_string()))?;

        Ok(Box::new(MemoryTransport {
            inbound,
            outbound,
            closed: false,
        }))
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Client end of an in-memory connection.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<ClientSignal>,
    closed: bool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .send(ClientSignal::Frame(frame))
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            };
        }
        self.inbound.recv().await.unwrap_or(TransportEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        })
    }

    async fn pong(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(ClientSignal::Pong(payload))
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.outbound.send(ClientSignal::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Server end of an in-memory connection.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<ClientSignal>,
}

impl MemoryPeer {
    /// Deliver an event to the client.
    pub fn push(&self, event: TransportEvent) {
        let _ = self.to_client.send(event);
    }

    /// Deliver a binary frame to the client.
    pub fn send_frame(&self, frame: Vec<u8>) {
        self.push(TransportEvent::Frame(frame));
    }

    /// Ping the client.
    pub fn ping(&self, payload: Vec<u8>) {
        self.push(TransportEvent::Ping(payload));
    }

    /// Close the connection from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        self.push(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next thing the client did.
    pub async fn next_signal(&mut self) -> Option<ClientSignal> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, skipping pongs. `None` once the client closed.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.from_client.recv().await? {
                ClientSignal::Frame(frame) => return Some(frame),
                ClientSignal::Pong(_) => {}
                ClientSignal::Close { .. } => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skill_bridge_core::SessionConfig;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut transport = assert_ok!(connector.connect(&SessionConfig::default().endpoint()).await);
        let mut peer = peers.recv().await.unwrap();

        assert_ok!(transport.send(vec![1, 2, 3]).await);
        assert_eq!(peer.next_frame().await, Some(vec![1, 2, 3]));

        peer.send_frame(vec![9]);
        assert_eq!(transport.recv().await, TransportEvent::Frame(vec![9]));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (connector, mut peers) = MemoryConnector::new();
        let mut transport = assert_ok!(connector.connect(&SessionConfig::default().endpoint()).await);
        let mut peer = peers.recv().await.unwrap();

        transport.close(1000, "client destroyed").await;
        transport.close(1000, "client destroyed").await;

        assert_eq!(
            peer.next_signal().await,
            Some(ClientSignal::Close {
                code: 1000,
                reason: "client destroyed".to_string()
            })
        );
        assert_err!(transport.send(vec![1]).await);
    }

    #[tokio::test]
    async fn test_refusals() {
        let (connector, _peers) = MemoryConnector::new();
        connector.refuse_next(2);
        let endpoint = SessionConfig::default().endpoint();

        assert!(connector.connect(&endpoint).await.is_err());
        assert!(connector.connect(&endpoint).await.is_err());
        assert_ok!(connector.connect(&endpoint).await);
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn test_stalled_connect_never_resolves() {
        let (connector, _peers) = MemoryConnector::new();
        connector.stall_next(1);
        let endpoint = SessionConfig::default().endpoint();

        let stalled =
            tokio::time::timeout(std::time::Duration::from_millis(50), connector.connect(&endpoint)).await;
        assert!(stalled.is_err());
        assert_ok!(connector.connect(&endpoint).await);
        assert_eq!(connector.attempts(), 2);
    }
}
