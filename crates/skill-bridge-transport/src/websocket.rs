//! WebSocket transport to the coordination server.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use skill_bridge_core::{
    Connector, Endpoint, Transport, TransportError, TransportEvent,
    traits::CLOSE_ABNORMAL,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

/// Connector opening `ws://` / `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn tls_connector(endpoint: &Endpoint) -> Result<Option<tokio_tungstenite::Connector>, TransportError> {
    if !endpoint.use_tls || endpoint.verify_tls {
        return Ok(None);
    }

    tracing::warn!(
        host = %endpoint.host,
        "TLS verification disabled, accepting any server certificate"
    );
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    Ok(Some(tokio_tungstenite::Connector::NativeTls(tls)))
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        let url = endpoint.url();
        let connector = tls_connector(endpoint)?;

        let (ws, response) = connect_async_tls_with_config(url.as_str(), None, false, connector)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(%url, status = %response.status(), "WebSocket connected");

        Ok(Box::new(WsTransport { ws, closed: false }))
    }
}

/// A live WebSocket connection.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        self.ws
            .send(Message::Binary(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> TransportEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => return TransportEvent::Frame(data),
                Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text.into_bytes()),
                Some(Ok(Message::Ping(data))) => return TransportEvent::Ping(data),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((CLOSE_ABNORMAL, String::new()), |f| {
                        (u16::from(f.code), f.reason.into_owned())
                    });
                    return TransportEvent::Closed { code, reason };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => {
                    return TransportEvent::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: String::new(),
                    };
                }
            }
        }
    }

    async fn pong(&mut self, _payload: Vec<u8>) -> Result<(), TransportError> {
        // tungstenite queues the pong while reading the ping; flushing sends it now.
        self.ws
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            tracing::debug!("WebSocket close: {e}");
        }
    }
}
