//! Wire protocol and transports for the skill bridge.
//!
//! Provides:
//! - Envelope and payload types (JSON, integer message types)
//! - Envelope codec (gzip + base64 payload, gzip frame)
//! - Signing engine (canonical signing document, Ed25519 detached signatures)
//! - WebSocket transport (feature: websocket)
//! - In-memory transport for tests and embedding

pub mod codec;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod signing;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{CodecError, VerificationFailure};
pub use protocol::{AuthRequest, AuthResponse, Envelope, ErrorNotice, MessageType, Payload};
pub use signing::DocumentKeys;
