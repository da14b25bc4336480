//! Connection registry
//!
//! Creates the transport + pipeline pair for each session and tracks which
//! sessions currently own a transport. The id → slot map is the only state
//! shared across sessions; it is only held locked while being read or
//! mutated, never across transport I/O.

use super::transport::{
    IceServer, IncomingTrack, RtcTransport, TrackKind, TransportFactory, TransportObserver,
    TransportState,
};
use crate::{Error, Result};
use dbmeter_core::{ExtractorConfig, FramePipeline, NumberExtractor, PipelineEvent, TextRecognizer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Where a session delivers pipeline and transport events
#[derive(Debug, Clone)]
pub struct SessionChannels {
    pub pipeline_events: mpsc::UnboundedSender<PipelineEvent>,
    pub transport_events: mpsc::UnboundedSender<TransportState>,
}

/// Transport and pipeline owned by one session
///
/// Not `Clone`: handing it back to [`ConnectionRegistry::release`] consumes it,
/// so a connection is released at most once.
pub struct ConnectionHandle {
    session_id: String,
    transport: Arc<dyn RtcTransport>,
    pipeline: Arc<FramePipeline>,
}

impl ConnectionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn transport(&self) -> &Arc<dyn RtcTransport> {
        &self.transport
    }

    pub fn pipeline(&self) -> &Arc<FramePipeline> {
        &self.pipeline
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("session_id", &self.session_id)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

enum Slot {
    /// `create` is building the transport
    Creating,
    Live(Arc<dyn RtcTransport>),
}

/// Owns the id → connection mapping for all sessions
pub struct ConnectionRegistry {
    factory: Arc<dyn TransportFactory>,
    recognizer: Arc<dyn TextRecognizer>,
    ice_servers: Vec<IceServer>,
    extractor_config: ExtractorConfig,
    max_sessions: usize,
    slots: RwLock<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    /// Create a registry
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds the media transport for each session
    /// * `recognizer` - Text-recognition capability shared by all pipelines
    /// * `ice_servers` - NAT-traversal servers given to every transport
    /// * `extractor_config` - Initial configuration of every new pipeline
    /// * `max_sessions` - Maximum number of sessions holding a transport
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        recognizer: Arc<dyn TextRecognizer>,
        ice_servers: Vec<IceServer>,
        extractor_config: ExtractorConfig,
        max_sessions: usize,
    ) -> Self {
        Self {
            factory,
            recognizer,
            ice_servers,
            extractor_config,
            max_sessions,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Build the transport and pipeline for `session_id`
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the session already has a transport, the
    /// session limit is reached, or the transport cannot be created.
    pub async fn create(&self, session_id: &str, channels: SessionChannels) -> Result<ConnectionHandle> {
        {
            let mut slots = self.slots.write().await;

            if slots.contains_key(session_id) {
                return Err(Error::Transport(format!(
                    "Session {} already has a transport",
                    session_id
                )));
            }
            if slots.len() >= self.max_sessions {
                return Err(Error::Transport(format!(
                    "Maximum session limit reached ({})",
                    self.max_sessions
                )));
            }

            slots.insert(session_id.to_string(), Slot::Creating);
        }

        match self.build(session_id, channels).await {
            Ok(handle) => {
                self.slots.write().await.insert(
                    session_id.to_string(),
                    Slot::Live(Arc::clone(&handle.transport)),
                );
                info!("Created connection for session {}", session_id);
                Ok(handle)
            }
            Err(e) => {
                self.slots.write().await.remove(session_id);
                Err(e)
            }
        }
    }

    async fn build(&self, session_id: &str, channels: SessionChannels) -> Result<ConnectionHandle> {
        let extractor = NumberExtractor::new(Arc::clone(&self.recognizer))?;
        let pipeline = FramePipeline::new(
            session_id,
            extractor,
            self.extractor_config.clone(),
            channels.pipeline_events,
        );

        let observer = Arc::new(SessionObserver {
            session_id: session_id.to_string(),
            pipeline: Arc::clone(&pipeline),
            transport_events: channels.transport_events,
        });

        match self
            .factory
            .create(session_id, &self.ice_servers, observer)
            .await
        {
            Ok(transport) => Ok(ConnectionHandle {
                session_id: session_id.to_string(),
                transport,
                pipeline,
            }),
            Err(e) => {
                pipeline.close();
                Err(match e {
                    Error::Transport(_) => e,
                    other => Error::Transport(format!("Failed to create transport: {}", other)),
                })
            }
        }
    }

    /// Close the pipeline and transport of a session and forget it
    ///
    /// Teardown failures are logged, never returned.
    pub async fn release(&self, handle: ConnectionHandle) {
        let ConnectionHandle {
            session_id,
            transport,
            pipeline,
        } = handle;

        pipeline.close();

        if let Err(e) = transport.close().await {
            warn!("Error closing transport for session {}: {}", session_id, e);
        }

        if self.slots.write().await.remove(&session_id).is_none() {
            debug!("Session {} was not registered", session_id);
        }

        info!("WebRTC peer connection closed for session {}", session_id);
    }

    /// Number of sessions holding (or building) a transport
    pub async fn connection_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Whether `session_id` has a live transport
    pub async fn contains(&self, session_id: &str) -> bool {
        matches!(self.slots.read().await.get(session_id), Some(Slot::Live(_)))
    }

    /// Transport of `session_id`, once it is live
    pub async fn transport(&self, session_id: &str) -> Option<Arc<dyn RtcTransport>> {
        match self.slots.read().await.get(session_id) {
            Some(Slot::Live(transport)) => Some(Arc::clone(transport)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("ice_servers", &self.ice_servers)
            .field("max_sessions", &self.max_sessions)
            .finish_non_exhaustive()
    }
}

/// Wires transport events of one session to its pipeline and session loop
struct SessionObserver {
    session_id: String,
    pipeline: Arc<FramePipeline>,
    transport_events: mpsc::UnboundedSender<TransportState>,
}

impl TransportObserver for SessionObserver {
    fn on_track(&self, track: IncomingTrack) {
        match (track.kind, track.frames) {
            (TrackKind::Video, Some(frames)) => {
                info!(
                    "Video track {} received for session {}",
                    track.id, self.session_id
                );
                self.pipeline.attach(frames);
            }
            (TrackKind::Video, None) => {
                warn!(
                    "Video track {} of session {} has no frame source",
                    track.id, self.session_id
                );
            }
            (TrackKind::Audio, _) => {
                debug!(
                    "Ignoring audio track {} of session {}",
                    track.id, self.session_id
                );
            }
        }
    }

    fn on_state_change(&self, state: TransportState) {
        if self.transport_events.send(state).is_err() {
            debug!(
                "Session {} is gone, dropping state {:?}",
                self.session_id, state
            );
        }
    }
}
