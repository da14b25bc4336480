//! WebSocket signaling server
//!
//! Binds a TCP listener and runs the accept loop on a spawned task. Each
//! accepted connection is served on its own task; shutdown stops the accept
//! loop, ends every open session through its normal close path and waits for
//! them to finish.

use super::handler::{handle_connection, SharedState};
use crate::config::ServerConfig;
use crate::peer::ConnectionRegistry;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// WebSocket signaling server
pub struct WebSocketSignalingServer {
    /// Shared state
    state: Arc<SharedState>,
}

impl WebSocketSignalingServer {
    /// Create a new WebSocket signaling server
    pub fn new(config: Arc<ServerConfig>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            state: Arc::new(SharedState::new(config, registry)),
        }
    }

    /// Get shared state (for external access)
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns once the listener is bound. The returned handle shuts the
    /// server down.
    pub async fn start(self) -> Result<WebSocketServerHandle> {
        let addr = self.state.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind WebSocket server to {}: {}", addr, e);
            e
        })?;
        let local_addr = listener.local_addr()?;

        info!(
            "WebSocket signaling server listening on ws://{}{}",
            local_addr, self.state.config.signaling_path
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let task = tokio::spawn(accept_loop(listener, self.state, shutdown_tx.clone()));

        Ok(WebSocketServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<SharedState>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        info!("Accepted WebSocket connection from {}", peer_addr);
                        let state = Arc::clone(&state);
                        let shutdown = shutdown_tx.subscribe();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, state, shutdown).await {
                                error!("WebSocket connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept WebSocket connection: {}", e);
                    }
                }
            }
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!("WebSocket connection task failed: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("WebSocket signaling server received shutdown signal");
                break;
            }
        }
    }

    drop(listener);
    debug!("Waiting for {} open connections to close", connections.len());
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            error!("WebSocket connection task failed: {}", e);
        }
    }

    info!("WebSocket signaling server accept loop exited");
}

/// Handle for controlling the WebSocket server
pub struct WebSocketServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl WebSocketServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every open session and wait for them
    pub async fn shutdown(self) {
        info!("Sending shutdown signal to WebSocket server");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.task.await {
            error!("WebSocket server task failed: {}", e);
        }
        info!("WebSocket server stopped");
    }
}
