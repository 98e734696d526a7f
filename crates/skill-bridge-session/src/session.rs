//! Secure session state machine.
//!
//! A [`Session`] owns at most one transport at a time. All of its work runs on
//! one task: host commands, transport events, the pending connection attempt
//! and timer deadlines are handled one after the other, each to completion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use skill_bridge_core::{
    Connector, EventStore, SessionConfig, SessionKeys, SkillReply, SkillRequestNotice, Status,
    Transport, TransportError, TransportEvent, traits::CLOSE_NORMAL,
};
use skill_bridge_transport::{
    AuthRequest, AuthResponse, CodecError, DocumentKeys, Envelope, Payload, VerificationFailure,
    codec, signing,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    SessionError,
    backoff::LinearBackoff,
    sequence::{SequenceTracker, check_timestamp},
    timer::{TimerKind, Timers},
};

/// Session identifier, also used as the skill request correlation id.
pub type SessionId = Uuid;

/// Close reason sent whenever the client drops a transport.
pub const CLOSE_REASON: &str = "client destroyed";

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Transport open, auth request not yet sent.
    Connected,
    Authenticating,
    Authenticated,
    /// Transport open, server refused the instance.
    AuthRejected,
    /// Torn down for good.
    Closed,
}

/// Work sent to the session task by a [`SessionHandle`](crate::SessionHandle).
#[derive(Debug)]
pub(crate) enum Command {
    SkillResponse {
        body: Value,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Reply {
        message: SkillReply,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

type ConnectFuture = BoxFuture<'static, Result<Box<dyn Transport>, TransportError>>;

enum Wake {
    Command(Option<Command>),
    Connected(Result<Box<dyn Transport>, TransportError>),
    Transport(TransportEvent),
    Timer,
}

/// Secure session with the coordination server.
pub struct Session<C> {
    id: SessionId,
    config: SessionConfig,
    keys: SessionKeys,
    document_keys: DocumentKeys,
    connector: Arc<C>,
    connecting: Option<ConnectFuture>,
    transport: Option<Box<dyn Transport>>,
    state: SessionState,
    status: Option<Status>,
    sequences: SequenceTracker,
    backoff: LinearBackoff,
    timers: Timers,
    events: Arc<EventStore>,
}

impl<C: Connector + 'static> Session<C> {
    /// Create a disconnected session.
    #[must_use]
    pub fn new(config: SessionConfig, keys: SessionKeys, connector: C) -> Self {
        let backoff = LinearBackoff::new(config.backoff);
        let mut session = Self {
            id: Uuid::new_v4(),
            document_keys: DocumentKeys::from(&keys),
            config,
            keys,
            connector: Arc::new(connector),
            connecting: None,
            transport: None,
            state: SessionState::Disconnected,
            status: None,
            sequences: SequenceTracker::new(),
            backoff,
            timers: Timers::new(),
            events: Arc::new(EventStore::new()),
        };
        session.set_status(Status::Disconnected);
        session
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn sequences(&self) -> SequenceTracker {
        self.sequences
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    #[must_use]
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }

    /// Whether a transport is currently held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a connection attempt is in flight.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    /// Start establishing a transport.
    ///
    /// The attempt itself is driven by the session task, which keeps serving
    /// commands while it is pending. Does nothing once closed, while a
    /// transport is live or being opened, or when auto-connect is disabled.
    pub async fn open(&mut self) {
        if self.state == SessionState::Closed
            || self.transport.is_some()
            || self.connecting.is_some()
            || !self.config.connect
        {
            return;
        }

        self.teardown().await;
        self.state = SessionState::Connecting;
        self.set_status(Status::Connecting);

        let endpoint = self.config.endpoint();
        let limit = self.config.connect_timeout();
        tracing::info!(session = %self.id, url = %endpoint.url(), "Connecting");

        let connector = Arc::clone(&self.connector);
        self.connecting = Some(Box::pin(async move {
            tokio::time::timeout(limit, connector.connect(&endpoint))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::ConnectionFailed(format!(
                        "timed out after {}ms",
                        limit.as_millis()
                    )))
                })
        }));
    }

    /// Apply the outcome of the pending connection attempt.
    async fn on_connect(&mut self, result: Result<Box<dyn Transport>, TransportError>) {
        self.connecting = None;
        if self.state == SessionState::Closed {
            return;
        }
        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.on_open().await;
            }
            Err(e) => self.on_error(&e.to_string()).await,
        }
    }

    async fn on_open(&mut self) {
        let drawn = self.backoff.on_connected();
        tracing::debug!(session = %self.id, ?drawn, "Transport open");

        self.state = SessionState::Connected;
        self.set_status(Status::Connected);
        self.send_auth_request().await;
    }

    async fn on_close(&mut self, code: u16, reason: &str) {
        self.set_status(Status::Disconnected);
        self.diagnostic(format!("websocket close. code '{code}' reason '{reason}'"));
        self.teardown().await;
        self.schedule_reconnect();
    }

    async fn on_error(&mut self, detail: &str) {
        self.diagnostic(format!("websocket error: {detail}"));
        self.set_status(Status::WebsocketError);
        self.teardown().await;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let delay = self.backoff.next_delay();
        tracing::info!(session = %self.id, ?delay, "Reconnect scheduled");
        self.timers.schedule(Instant::now() + delay, TimerKind::Reconnect);
    }

    async fn on_ping(&mut self, payload: Vec<u8>) {
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.pong(payload).await {
                tracing::warn!(session = %self.id, "Failed to answer ping: {e}");
            }
        }
    }

    /// Handle one event from the current transport.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.on_frame(&frame),
            TransportEvent::Ping(payload) => self.on_ping(payload).await,
            TransportEvent::Closed { code, reason } => self.on_close(code, &reason).await,
            TransportEvent::Error(detail) => self.on_error(&detail).await,
        }
    }

    fn on_frame(&mut self, frame: &[u8]) {
        match codec::decode_frame(frame) {
            Ok(envelope) => self.process_message(&envelope, Utc::now()),
            Err(e) => self.diagnostic(format!("dropped malformed frame: {e}")),
        }
    }

    /// Verify an inbound envelope and dispatch it.
    ///
    /// Anything that fails verification is dropped; the transport stays up.
    pub fn process_message(&mut self, envelope: &Envelope, now: DateTime<Utc>) {
        if let Err(failure) = self.verify(envelope, now) {
            self.diagnostic(format!("message verification failed: {failure}"));
            return;
        }

        let payload = codec::decode(envelope).and_then(|(kind, body)| {
            Payload::from_parts(kind, body).map_err(CodecError::from)
        });
        match payload {
            Ok(Some(payload)) => self.dispatch(payload),
            Ok(None) => {
                tracing::debug!(session = %self.id, sequence = envelope.sequence, "Ignoring message of unknown type");
            }
            Err(e) => self.diagnostic(format!("dropped undecodable payload: {e}")),
        }
    }

    fn verify(&mut self, envelope: &Envelope, now: DateTime<Utc>) -> Result<(), VerificationFailure> {
        self.sequences.check_server(envelope.sequence)?;
        check_timestamp(&envelope.timestamp, now, &self.config.clock_skew)?;
        signing::check_signature(envelope, self.keys.server_key(), &self.document_keys)
    }

    fn dispatch(&mut self, payload: Payload) {
        match payload {
            Payload::AuthResponse(response) => self.on_auth_response(response),
            Payload::Error(notice) => self.diagnostic(format!("from server: {}", notice.message)),
            Payload::SkillRequest(body) => {
                tracing::info!(session = %self.id, "Skill request received");
                self.events
                    .push_skill_request(SkillRequestNotice::new(body, self.id));
            }
            Payload::AuthRequest(_) | Payload::SkillResponse(_) => {
                tracing::debug!(session = %self.id, kind = ?payload.message_type(), "Ignoring client-bound message type");
            }
        }
    }

    fn on_auth_response(&mut self, response: AuthResponse) {
        if response.success {
            tracing::info!(session = %self.id, "Authenticated");
            self.state = SessionState::Authenticated;
            self.set_status(Status::Authenticated);
            return;
        }

        self.state = SessionState::AuthRejected;
        self.set_status(Status::AuthError);
        self.diagnostic(format!("authentication failed: {}", response.message));
        self.timers
            .schedule(Instant::now() + self.config.auth_retry(), TimerKind::AuthRetry);
    }

    async fn send_auth_request(&mut self) {
        if self.transport.is_some() {
            self.state = SessionState::Authenticating;
            self.set_status(Status::Authenticating);
        }

        let request = AuthRequest {
            instance_public_key: self.keys.instance_public_key().to_string(),
            server_public_key: self.keys.server_public_key().to_string(),
            node_version: self.config.runtime_version.clone(),
            package_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };
        if let Err(e) = self.process_outbound(&Payload::AuthRequest(request)).await {
            self.diagnostic(format!("auth request not sent: {e}"));
        }
    }

    /// Sign, frame and send one payload.
    ///
    /// Returns the sequence number the envelope went out with. Nothing is
    /// queued: without a transport the payload is dropped.
    ///
    /// # Errors
    /// Returns `NotConnected` without a transport, or the encode/send failure.
    pub async fn process_outbound(&mut self, payload: &Payload) -> Result<u64, SessionError> {
        let Some(transport) = self.transport.as_mut() else {
            tracing::warn!(session = %self.id, kind = ?payload.message_type(), "websocket not connected, message dropped");
            return Err(SessionError::NotConnected);
        };

        let sequence = self.sequences.next_client();
        let envelope = codec::encode(&payload.to_value()?, payload.message_type(), sequence, Utc::now())?;
        let envelope = signing::sign(envelope, self.keys.signing_key(), &self.document_keys);
        let frame = codec::encode_frame(&envelope)?;

        if let Err(e) = transport.send(frame).await {
            tracing::error!(session = %self.id, sequence, "Send failed: {e}");
            return Err(e.into());
        }
        tracing::debug!(session = %self.id, sequence, kind = ?payload.message_type(), "Sent");
        Ok(sequence)
    }

    /// Send a skill response body to the server.
    ///
    /// # Errors
    /// See [`process_outbound`](Self::process_outbound).
    pub async fn process_skill_response(&mut self, body: Value) -> Result<u64, SessionError> {
        self.process_outbound(&Payload::SkillResponse(body)).await
    }

    /// Forward a host reply if it belongs to this session.
    ///
    /// # Errors
    /// Returns `UnknownCorrelation` for a reply addressed elsewhere.
    pub async fn route_reply(&mut self, reply: SkillReply) -> Result<u64, SessionError> {
        if reply.skill_request_node_id != self.id {
            return Err(SessionError::UnknownCorrelation(reply.skill_request_node_id));
        }
        self.process_skill_response(reply.skill_response).await
    }

    /// Drop the current transport and reset both counters.
    ///
    /// Safe to call repeatedly.
    async fn teardown(&mut self) {
        self.sequences.reset();
        self.connecting = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close(CLOSE_NORMAL, CLOSE_REASON).await;
            self.set_status(Status::Disconnected);
        }
        if self.state != SessionState::Closed {
            self.state = SessionState::Disconnected;
        }
    }

    /// Tear the session down permanently.
    ///
    /// A pending connection attempt is dropped. Pending timers stay queued
    /// and fire as no-ops.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.teardown().await;
        self.state = SessionState::Closed;
        self.events.push_closed();
        tracing::info!(session = %self.id, "Session closed");
    }

    /// Run every timer due at `now`.
    pub async fn fire_due_timers(&mut self, now: Instant) {
        for kind in self.timers.take_due(now) {
            if self.state == SessionState::Closed {
                tracing::debug!(session = %self.id, ?kind, "Timer fired after close");
                continue;
            }
            match kind {
                TimerKind::Reconnect => self.open().await,
                TimerKind::AuthRetry => {
                    tracing::info!(session = %self.id, "Retrying authentication");
                    self.send_auth_request().await;
                }
            }
        }
    }

    /// Drive the session until it is closed or every handle is gone.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.open().await;

        loop {
            let deadline = self.timers.next_deadline();
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                result = next_connect(self.connecting.as_mut()) => Wake::Connected(result),
                event = next_event(self.transport.as_mut()) => Wake::Transport(event),
                () = sleep_until(deadline) => Wake::Timer,
            };

            match wake {
                Wake::Command(Some(Command::SkillResponse { body, reply })) => {
                    let result = self.process_skill_response(body).await;
                    let _ = reply.send(result);
                }
                Wake::Command(Some(Command::Reply { message, reply })) => {
                    let result = self.route_reply(message).await;
                    let _ = reply.send(result);
                }
                Wake::Command(Some(Command::Shutdown { done })) => {
                    self.close().await;
                    let _ = done.send(());
                }
                Wake::Command(None) => self.close().await,
                Wake::Connected(result) => self.on_connect(result).await,
                Wake::Transport(event) => self.handle_transport_event(event).await,
                Wake::Timer => self.fire_due_timers(Instant::now()).await,
            }

            if self.state == SessionState::Closed {
                break;
            }
        }
    }

    fn set_status(&mut self, status: Status) {
        if self.status == Some(status) {
            return;
        }
        self.status = Some(status);
        tracing::info!(session = %self.id, %status, "Status");
        self.events.push_status(status);
    }

    fn diagnostic(&self, message: String) {
        tracing::error!(session = %self.id, "{message}");
        self.events.push_diagnostic(message);
    }
}

async fn next_connect(
    pending: Option<&mut ConnectFuture>,
) -> Result<Box<dyn Transport>, TransportError> {
    match pending {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_event(transport: Option<&mut Box<dyn Transport>>) -> TransportEvent {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
