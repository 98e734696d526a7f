//! Secure session with the skill coordination server.
//!
//! Provides:
//! - `Session` - Connection lifecycle, handshake, verification and dispatch
//! - `SessionHandle` - Host entry points to a spawned session
//! - `LinearBackoff` - Reconnect delays
//! - `SequenceTracker` - Per-connection sequence counters

pub mod backoff;
pub mod error;
pub mod handle;
pub mod sequence;
pub mod session;
pub mod timer;

pub use backoff::LinearBackoff;
pub use error::SessionError;
pub use handle::SessionHandle;
pub use sequence::SequenceTracker;
pub use session::{Session, SessionId, SessionState};
