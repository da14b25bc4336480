//! WebRTC peer connection backed by webrtc-rs

use crate::media::video::spawn_video_source;
use crate::peer::transport::{
    IceServer, IncomingTrack, RtcTransport, TransportFactory, TransportObserver, TransportState,
};
use crate::signaling::protocol::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Creates [`WebRtcPeer`]s
#[derive(Debug, Clone)]
pub struct WebRtcTransportFactory {
    gathering_timeout: Duration,
}

impl WebRtcTransportFactory {
    /// Answers are sent after local ICE gathering completes or `gathering_timeout` elapses
    pub fn new(gathering_timeout: Duration) -> Self {
        Self { gathering_timeout }
    }
}

impl Default for WebRtcTransportFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        session_id: &str,
        ice_servers: &[IceServer],
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn RtcTransport>> {
        let peer = WebRtcPeer::new(
            session_id.to_string(),
            ice_servers,
            observer,
            self.gathering_timeout,
        )
        .await?;
        Ok(Arc::new(peer))
    }
}

/// Receive-only peer connection for one browser session
pub struct WebRtcPeer {
    session_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    gathering_timeout: Duration,
}

impl WebRtcPeer {
    /// Create a new peer connection
    ///
    /// # Arguments
    ///
    /// * `session_id` - Signaling session that owns this connection
    /// * `ice_servers` - STUN/TURN servers for NAT traversal
    /// * `observer` - Receives track and connection-state events
    #[instrument(skip(ice_servers, observer), fields(session_id = %session_id))]
    pub async fn new(
        session_id: String,
        ice_servers: &[IceServer],
        observer: Arc<dyn TransportObserver>,
        gathering_timeout: Duration,
    ) -> Result<Self> {
        info!("Creating peer connection for session {}", session_id);

        let mut media_engine = MediaEngine::default();
        register_codecs(&mut media_engine)?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let state_observer = Arc::clone(&observer);
        let state_session = session_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let observer = Arc::clone(&state_observer);
                let session_id = state_session.clone();

                Box::pin(async move {
                    let state = match s {
                        RTCPeerConnectionState::New => TransportState::New,
                        RTCPeerConnectionState::Connecting => TransportState::Connecting,
                        RTCPeerConnectionState::Connected => TransportState::Connected,
                        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
                        RTCPeerConnectionState::Failed => TransportState::Failed,
                        RTCPeerConnectionState::Closed => TransportState::Closed,
                        _ => return,
                    };
                    info!("Session {} connection state is {:?}", session_id, state);
                    observer.on_state_change(state);
                })
            },
        ));

        let track_session = session_id.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let observer = Arc::clone(&observer);
                let session_id = track_session.clone();

                Box::pin(async move {
                    info!(
                        "Track received for session {}: kind={}",
                        session_id,
                        track.kind()
                    );

                    let incoming = match track.kind() {
                        RTPCodecType::Video => {
                            let frames = spawn_video_source(Arc::clone(&track), &session_id);
                            IncomingTrack::video(track.id(), frames)
                        }
                        _ => IncomingTrack::audio(track.id()),
                    };
                    observer.on_track(incoming);
                })
            },
        ));

        Ok(Self {
            session_id,
            peer_connection,
            gathering_timeout,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(feature = "h264")]
fn register_codecs(media_engine: &mut MediaEngine) -> Result<()> {
    use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS};
    use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters};

    // Only H.264 can be decoded, so it is the only video codec offered back
    let codecs = [
        (
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_H264.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line:
                        "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                            .to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 102,
                ..Default::default()
            },
            RTPCodecType::Video,
        ),
        (
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        ),
    ];

    for (codec, kind) in codecs {
        media_engine
            .register_codec(codec, kind)
            .map_err(|e| Error::WebRtcError(format!("Failed to register codec: {}", e)))?;
    }
    Ok(())
}

#[cfg(not(feature = "h264"))]
fn register_codecs(media_engine: &mut MediaEngine) -> Result<()> {
    media_engine
        .register_default_codecs()
        .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))
}

#[async_trait]
impl RtcTransport for WebRtcPeer {
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        if offer.sdp_type != "offer" {
            return Err(Error::SdpError(format!(
                "expected an offer, got '{}'",
                offer.sdp_type
            )));
        }

        let offer = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        // Candidates go out inside the answer rather than trickled
        let mut gathering_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        if tokio::time::timeout(self.gathering_timeout, gathering_complete.recv())
            .await
            .is_err()
        {
            warn!(
                "ICE gathering for session {} did not finish within {:?}, answering with partial candidates",
                self.session_id, self.gathering_timeout
            );
        }

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::SdpError("No local description after setting answer".to_string())
            })?;

        debug!("Created SDP answer for session {}", self.session_id);

        Ok(SessionDescription::answer(local_desc.sdp))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!(
            "Adding ICE candidate for session {}: {}",
            self.session_id, candidate.candidate
        );

        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection for session {}", self.session_id);

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Teardown(format!("Failed to close connection: {}", e)))
    }
}
