//! Signaling test harness
//!
//! A scripted in-memory transport stands in for the WebRTC stack so sessions
//! can be driven end to end without ICE or a browser:
//!
//! - `MockTransportFactory` records every transport it builds
//! - `MockTransport` answers offers, records candidates and lets the test
//!   push video tracks or inject connection states
//! - `TestClient` runs a `SignalingSession` on its own task
//!
//! Typical flow:
//!
//! 1. Build a registry with `registry(factory, recognizer, config)`
//! 2. `TestClient::spawn(registry)` and `send` an offer
//! 3. Push frames through `factory.last().push_video(..)`
//! 4. Assert on what `recv` returns

#![allow(dead_code)]

use async_trait::async_trait;
use dbmeter_core::{
    ExtractorConfig, FrameSample, FrameSender, PixelFormat, TextRecognizer,
};
use dbmeter_webrtc::signaling::protocol::{IceCandidate, SessionDescription};
use dbmeter_webrtc::{
    ConnectionRegistry, Error, IceServer, IncomingTrack, Result, RtcTransport, SessionState,
    SignalingMessage, SignalingSession, TransportFactory, TransportObserver, TransportState,
};
use image::GrayImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long a test waits for a message before giving up
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// SDP body of every offer sent by the tests
pub const OFFER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\n";

/// In-memory transport
pub struct MockTransport {
    session_id: String,
    observer: Arc<dyn TransportObserver>,
    fail_accept: bool,
    candidates: Mutex<Vec<IceCandidate>>,
    closes: AtomicUsize,
}

impl MockTransport {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Announce a remote video track; frames sent on the returned sender reach the pipeline
    pub fn push_video(&self, track_id: &str) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer.on_track(IncomingTrack::video(track_id, rx));
        tx
    }

    /// Announce a remote audio track
    pub fn push_audio(&self, track_id: &str) {
        self.observer.on_track(IncomingTrack::audio(track_id));
    }

    /// Report a connection state change
    pub fn set_state(&self, state: TransportState) {
        self.observer.on_state_change(state);
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RtcTransport for MockTransport {
    async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        if self.fail_accept {
            return Err(Error::SdpError("remote description rejected".to_string()));
        }
        Ok(SessionDescription::answer(format!("answer:{}", offer.sdp)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds `MockTransport`s and keeps them for inspection
#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<Vec<Arc<MockTransport>>>,
    ice_servers: Mutex<Vec<IceServer>>,
    fail_create: AtomicBool,
    fail_accept: AtomicBool,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next transports refuse to be created
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Make the next transports reject every offer
    pub fn fail_accept(&self) {
        self.fail_accept.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.transports.lock().len()
    }

    /// Most recently created transport
    pub fn last(&self) -> Arc<MockTransport> {
        self.transports
            .lock()
            .last()
            .cloned()
            .expect("no transport has been created")
    }

    /// ICE servers handed to the last transport
    pub fn ice_servers(&self) -> Vec<IceServer> {
        self.ice_servers.lock().clone()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        session_id: &str,
        ice_servers: &[IceServer],
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn RtcTransport>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::WebRtcError("peer connection unavailable".to_string()));
        }

        *self.ice_servers.lock() = ice_servers.to_vec();
        let transport = Arc::new(MockTransport {
            session_id: session_id.to_string(),
            observer,
            fail_accept: self.fail_accept.load(Ordering::SeqCst),
            candidates: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        });
        self.transports.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Recognizer that always reads `text` and records the image sizes it saw
pub struct FixedRecognizer {
    text: String,
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl FixedRecognizer {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            sizes: Mutex::new(Vec::new()),
        })
    }

    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.sizes.lock().clone()
    }
}

#[async_trait]
impl TextRecognizer for FixedRecognizer {
    async fn recognize(
        &self,
        image: &GrayImage,
        _engine_args: &str,
    ) -> dbmeter_core::Result<String> {
        self.sizes.lock().push((image.width(), image.height()));
        Ok(self.text.clone())
    }
}

/// Route logs to the test output; `RUST_LOG` selects the level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Extractor settings for tests: no cooldown between recognitions
pub fn test_extractor_config() -> ExtractorConfig {
    ExtractorConfig::default().with_detection_interval(Duration::ZERO)
}

/// Registry backed by `factory` and `recognizer`
pub fn registry(
    factory: Arc<MockTransportFactory>,
    recognizer: Arc<FixedRecognizer>,
    max_sessions: usize,
) -> Arc<ConnectionRegistry> {
    init_logging();
    Arc::new(ConnectionRegistry::new(
        factory,
        recognizer,
        vec![IceServer::stun("stun:stun.l.google.com:19302")],
        test_extractor_config(),
        max_sessions,
    ))
}

/// Solid gray 160x120 frame
pub fn gray_frame(frame_count: u64) -> FrameSample {
    FrameSample::new(vec![128u8; 160 * 120], 160, 120, PixelFormat::Gray8, frame_count)
}

/// `offer` message as a browser sends it
pub fn offer_json() -> String {
    serde_json::json!({
        "type": "offer",
        "offer": { "type": "offer", "sdp": OFFER_SDP }
    })
    .to_string()
}

/// `ice-candidate` message as a browser sends it
pub fn candidate_json() -> String {
    serde_json::json!({
        "type": "ice-candidate",
        "candidate": {
            "candidate": "candidate:1 1 UDP 2122252543 192.168.1.2 50000 typ host",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        }
    })
    .to_string()
}

/// Signaling session running on its own task, fed like a WebSocket would feed it
pub struct TestClient {
    inbound: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::UnboundedReceiver<SignalingMessage>,
    task: JoinHandle<SignalingSession>,
}

impl TestClient {
    pub fn spawn(registry: Arc<ConnectionRegistry>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut session = SignalingSession::new(registry, outbound_tx);
        let task = tokio::spawn(async move {
            session.run(UnboundedReceiverStream::new(inbound_rx)).await;
            session
        });

        Self {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            task,
        }
    }

    /// Send raw text as the client
    pub fn send(&self, text: impl Into<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(text.into());
        }
    }

    /// Next message from the server
    pub async fn recv(&mut self) -> SignalingMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("session dropped its outbound channel")
    }

    /// Next message, or `None` if nothing arrives within `wait`
    pub async fn try_recv_within(&mut self, wait: Duration) -> Option<SignalingMessage> {
        tokio::time::timeout(wait, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until every message sent so far has been handled
    ///
    /// Sends a malformed message and waits for its error reply; the session
    /// handles inbound messages in order.
    pub async fn sync(&mut self) {
        self.send("not json");
        match self.recv().await {
            SignalingMessage::Error { .. } => {}
            other => panic!("expected sync error reply, got {:?}", other),
        }
    }

    /// Send an offer and wait for the answer
    pub async fn connect(&mut self) -> SessionDescription {
        self.send(offer_json());
        match self.recv().await {
            SignalingMessage::Answer { answer } => answer,
            other => panic!("expected answer, got {:?}", other),
        }
    }

    /// Close the client side of the connection
    pub fn disconnect(&mut self) {
        self.inbound.take();
    }

    /// Wait for the session to end and return it
    pub async fn finish(self) -> SignalingSession {
        let session = tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("session did not end")
            .expect("session task panicked");
        assert_eq!(session.state(), SessionState::Closed);
        session
    }
}

/// Push frames until the session reports numbers, returning them
///
/// A frame arriving while the previous extraction is still finishing is
/// dropped, so a single frame is not always enough.
pub async fn numbers_for(
    client: &mut TestClient,
    frames: &FrameSender,
    first_frame: u64,
) -> (Vec<String>, u64) {
    for frame_count in first_frame..first_frame + 50 {
        frames
            .send(Ok(gray_frame(frame_count)))
            .expect("pipeline stopped consuming frames");
        if let Some(message) = client.try_recv_within(Duration::from_millis(100)).await {
            match message {
                SignalingMessage::Numbers {
                    data, frame_count, ..
                } => return (data, frame_count),
                other => panic!("expected numbers, got {:?}", other),
            }
        }
    }
    panic!("no numbers reported after 50 frames");
}
