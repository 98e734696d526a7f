//! Host-facing handle to a running session.

use std::sync::Arc;

use serde_json::Value;
use skill_bridge_core::{Connector, EventStore, SessionEvent, SkillReply};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    SessionError,
    session::{Command, Session, SessionId},
};

const COMMAND_BUFFER: usize = 64;

/// Cloneable handle to a session task.
///
/// Dropping every handle closes the session.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<Command>,
    events: Arc<EventStore>,
}

impl<C: Connector + 'static> Session<C> {
    /// Move the session onto its own task and connect.
    #[must_use]
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            id: self.id(),
            commands,
            events: self.events(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }
}

impl SessionHandle {
    /// Correlation id stamped on every skill request this session delivers.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Send a skill response body.
    ///
    /// Resolves once the frame is handed to the transport.
    ///
    /// # Errors
    /// Returns `NotConnected` when no transport is open, `Closed` once the
    /// session has shut down, or the encode/send failure.
    pub async fn process_skill_response(&self, body: Value) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SkillResponse { body, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Forward a host reply to the server.
    ///
    /// # Errors
    /// Returns `UnknownCorrelation` if the reply names another session,
    /// otherwise as [`process_skill_response`](Self::process_skill_response).
    pub async fn route_reply(&self, message: SkillReply) -> Result<u64, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Reply { message, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Close the session for good and wait for the task to acknowledge.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Live session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.get_receiver()
    }

    /// Events reported so far.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.events.get_history()
    }

    #[must_use]
    pub const fn events(&self) -> &Arc<EventStore> {
        &self.events
    }
}
