//! Per-connection WebSocket handling

use crate::config::ServerConfig;
use crate::peer::ConnectionRegistry;
use crate::signaling::{SignalingMessage, SignalingSession};
use crate::Result;
use futures::{future, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

/// State shared by all connections of one server
#[derive(Debug)]
pub struct SharedState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<ConnectionRegistry>,
}

impl SharedState {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { config, registry }
    }
}

/// Upgrade `stream` and run a signaling session on it until either side closes
/// or the server shuts down
pub(super) async fn handle_connection(
    stream: TcpStream,
    state: Arc<SharedState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let signaling_path = state.config.signaling_path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == signaling_path {
            Ok(response)
        } else {
            debug!("Rejecting WebSocket upgrade for {}", request.uri().path());
            let mut not_found = ErrorResponse::new(Some("Not Found".to_string()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    info!("WebRTC signaling connection established");

    let (mut sink, source) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SignalingMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {} message: {}", message.type_name(), e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("WebSocket send failed: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let shutdown_signal = async move {
        let _ = shutdown.recv().await;
    };
    let inbound = source
        .take_until(shutdown_signal)
        .take_while(|message| {
            future::ready(match message {
                Ok(message) => !message.is_close(),
                Err(e) => {
                    debug!("WebSocket receive failed: {}", e);
                    false
                }
            })
        })
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        });

    let mut session = SignalingSession::new(Arc::clone(&state.registry), outbound_tx);
    session.run(Box::pin(inbound)).await;
    // Dropping the session drops the last outbound sender, which ends the writer
    drop(session);

    if let Err(e) = writer.await {
        error!("WebSocket writer task failed: {}", e);
    }
    info!("WebRTC signaling disconnected");
    Ok(())
}
