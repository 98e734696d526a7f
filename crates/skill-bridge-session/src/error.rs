//! Session errors.

use skill_bridge_core::TransportError;
use skill_bridge_transport::CodecError;
use uuid::Uuid;

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("websocket not connected")]
    NotConnected,
    #[error("session closed")]
    Closed,
    #[error("reply addressed to unknown session: {0}")]
    UnknownCorrelation(Uuid),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(CodecError::Json(e))
    }
}
