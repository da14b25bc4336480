//! Per-connection signaling state machine
//!
//! ```text
//!   Idle ──offer──► Negotiating ──answer sent──► Active
//!     │                  │                          │
//!     └──────────────────┴──────────► Closed ◄──────┘
//! ```
//!
//! A session owns at most one [`ConnectionHandle`]. Every way out of the
//! session (client disconnect, failed offer, terminal transport state, video
//! source failure, server shutdown, or the session simply being dropped)
//! goes through the registry's `release`, exactly once.

use super::protocol::{self, IceCandidate, Inbound, SessionDescription, SignalingMessage};
use crate::peer::{ConnectionHandle, ConnectionRegistry, SessionChannels, TransportState};
use crate::Result;
use dbmeter_core::PipelineEvent;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Signaling session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for an offer
    Idle,
    /// Offer received, transport being negotiated
    Negotiating,
    /// Answer sent; results flow to the client
    Active,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Negotiating) | (Negotiating, Active) | (Idle | Negotiating | Active, Closed)
        )
    }
}

enum Step {
    Inbound(String),
    Disconnected,
    Pipeline(PipelineEvent),
    Transport(TransportState),
}

/// Signaling session for one client connection
pub struct SignalingSession {
    id: String,
    state: SessionState,
    registry: Arc<ConnectionRegistry>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
    connection: Option<ConnectionHandle>,
    pipeline_tx: mpsc::UnboundedSender<PipelineEvent>,
    pipeline_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    transport_tx: mpsc::UnboundedSender<TransportState>,
    transport_rx: mpsc::UnboundedReceiver<TransportState>,
}

impl SignalingSession {
    /// Create an idle session that replies through `outbound`
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        outbound: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Self {
        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Idle,
            registry,
            outbound,
            connection: None,
            pipeline_tx,
            pipeline_rx,
            transport_tx,
            transport_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The connection, once an offer has been accepted
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    /// Drive the session until it closes
    ///
    /// `inbound` yields the client's text messages; its end means the client
    /// disconnected. The session is closed when this returns.
    pub async fn run<S>(&mut self, mut inbound: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        info!("Signaling session {} started", self.id);

        while self.state != SessionState::Closed {
            let step = tokio::select! {
                text = inbound.next() => match text {
                    Some(text) => Step::Inbound(text),
                    None => Step::Disconnected,
                },
                Some(event) = self.pipeline_rx.recv() => Step::Pipeline(event),
                Some(state) = self.transport_rx.recv() => Step::Transport(state),
            };

            match step {
                Step::Inbound(text) => self.handle_text(&text).await,
                Step::Disconnected => {
                    info!("Signaling session {} disconnected", self.id);
                    break;
                }
                Step::Pipeline(event) => self.handle_pipeline_event(event).await,
                Step::Transport(state) => self.handle_transport_state(state).await,
            }
        }

        self.close().await;
    }

    /// Handle one raw text message from the client
    pub async fn handle_text(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(Inbound::Message(message)) => self.handle_message(message).await,
            Ok(Inbound::Unknown(message_type)) => {
                warn!("Unknown message type: {}", message_type);
            }
            Err(e) => {
                warn!("Session {} received an invalid message: {}", self.id, e);
                self.send(SignalingMessage::error(e.to_string()));
            }
        }
    }

    /// Handle one decoded message from the client
    pub async fn handle_message(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::Offer { offer } => self.handle_offer(offer).await,
            SignalingMessage::IceCandidate { candidate } => {
                self.handle_ice_candidate(candidate).await
            }
            SignalingMessage::RoiToggle { enabled } => self.handle_roi_toggle(enabled),
            other => {
                warn!(
                    "Session {} ignoring '{}' message from client",
                    self.id,
                    other.type_name()
                );
            }
        }
    }

    async fn handle_offer(&mut self, offer: SessionDescription) {
        if self.state != SessionState::Idle {
            warn!(
                "Session {} received an offer while {:?}",
                self.id, self.state
            );
            self.send(SignalingMessage::error(format!(
                "Unexpected offer: session is {:?}",
                self.state
            )));
            return;
        }

        if let Err(e) = self.negotiate(offer).await {
            error!("Error handling offer: {}", e);
            self.fail(format!("Failed to process offer: {}", e)).await;
        }
    }

    async fn negotiate(&mut self, offer: SessionDescription) -> Result<()> {
        self.transition(SessionState::Negotiating);

        let channels = SessionChannels {
            pipeline_events: self.pipeline_tx.clone(),
            transport_events: self.transport_tx.clone(),
        };
        let handle = self.registry.create(&self.id, channels).await?;
        let transport = Arc::clone(handle.transport());
        // Owned before negotiating so a failure below still releases it
        self.connection = Some(handle);

        let answer = transport.accept_offer(offer).await?;
        self.send(SignalingMessage::Answer { answer });
        self.transition(SessionState::Active);

        info!("WebRTC connection established for session {}", self.id);
        Ok(())
    }

    async fn handle_ice_candidate(&mut self, candidate: IceCandidate) {
        let transport = match (&self.state, &self.connection) {
            (SessionState::Negotiating | SessionState::Active, Some(handle)) => {
                Arc::clone(handle.transport())
            }
            _ => {
                info!(
                    "Session {} has no transport yet, ignoring ICE candidate",
                    self.id
                );
                return;
            }
        };

        match transport.add_ice_candidate(candidate).await {
            Ok(()) => debug!("ICE candidate added for session {}", self.id),
            Err(e) => error!("Error adding ICE candidate: {}", e),
        }
    }

    fn handle_roi_toggle(&mut self, enabled: bool) {
        match (&self.state, &self.connection) {
            (SessionState::Active, Some(handle)) => {
                handle.pipeline().set_roi_enabled(enabled);
            }
            _ => {
                warn!(
                    "Session {} ignoring roi-toggle while {:?}",
                    self.id, self.state
                );
            }
        }
    }

    async fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Result(result) => {
                if self.state == SessionState::Active {
                    self.send(SignalingMessage::from(result));
                } else {
                    debug!(
                        "Session {} dropping result of frame {} while {:?}",
                        self.id, result.frame_count, self.state
                    );
                }
            }
            PipelineEvent::SourceFailed(reason) => {
                self.fail(format!("Video source failed: {}", reason)).await;
            }
        }
    }

    async fn handle_transport_state(&mut self, state: TransportState) {
        debug!("Session {} transport state {:?}", self.id, state);
        if state.is_terminal() {
            self.fail(format!("Connection {:?}", state).to_lowercase())
                .await;
        }
    }

    /// Report `message` to the client, then close
    async fn fail(&mut self, message: String) {
        self.send(SignalingMessage::error(message));
        self.close().await;
    }

    /// Close the session and release its connection
    ///
    /// Idempotent.
    pub async fn close(&mut self) {
        if !self.transition(SessionState::Closed) {
            return;
        }

        if let Some(handle) = self.connection.take() {
            self.registry.release(handle).await;
        }
        info!("Signaling session {} closed", self.id);
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(
                "Session {} ignoring transition {:?} -> {:?}",
                self.id, self.state, next
            );
            return false;
        }
        debug!("Session {} state {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }

    fn send(&self, message: SignalingMessage) {
        if self.outbound.send(message).is_err() {
            debug!("Session {} client is gone, message dropped", self.id);
        }
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        let Some(handle) = self.connection.take() else {
            return;
        };

        warn!("Session {} dropped without closing, releasing connection", self.id);
        let registry = Arc::clone(&self.registry);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { registry.release(handle).await });
            }
            Err(_) => {
                // Without a runtime only the pipeline can be stopped
                handle.pipeline().close();
                error!("No runtime to release transport of session {}", handle.session_id());
            }
        }
    }
}

impl std::fmt::Debug for SignalingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
