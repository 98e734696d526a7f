//! Core abstractions for the skill bridge secure session.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionConfig` - Connection, backoff and clock-skew options
//! - `Credentials` / `SessionKeys` - Instance and server key material
//! - `EventStore` - Broadcast + history of session events
//! - `Transport` / `Connector` traits the session drives

pub mod config;
pub mod event;
pub mod event_store;
pub mod keys;
pub mod traits;

pub use config::{BackoffConfig, ClockSkewConfig, ClockSkewPolicy, Endpoint, SessionConfig};
pub use event::{SessionEvent, SkillReply, SkillRequestNotice, SkillResponseTemplate, Status, StatusFill};
pub use event_store::EventStore;
pub use keys::{Credentials, KeyError, SessionKeys};
pub use traits::{Connector, Transport, TransportError, TransportEvent};
