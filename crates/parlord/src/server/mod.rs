//! TCP server for parlor.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Logs presence changes published by the registry
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//!         │
//!         │ Router
//!         ▼
//! ┌─────────────────┐
//! │ other sessions' │
//! │ outbound queues │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and allow continued operation
//! - A failing connection never affects the listener or other connections

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, DisconnectReason, MAX_LINE_LENGTH};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use parlor_core::ConnectionId;

use crate::config::ServerConfig;
use crate::registry::{PresenceEvent, RegistryHandle};
use crate::router::Router;
use crate::sink::SharedChatLog;

/// Pause after a failed accept, so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Chat server bound to a listening socket.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Routes lines between sessions
    router: Router,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    ///
    /// * `config` - Address and port to listen on
    /// * `registry` - Handle to the username registry
    /// * `log` - Sink receiving every relayed line
    /// * `cancel_token` - Token for graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        registry: RegistryHandle,
        log: SharedChatLog,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            local_addr,
            router: Router::new(registry, log),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the registry handle the server routes through.
    pub fn registry(&self) -> &RegistryHandle {
        self.router.registry()
    }

    /// Runs the accept loop until the cancellation token is triggered.
    ///
    /// Cancelling the token also closes every open session, since their
    /// tokens are children of this one.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Chat server listening");

        self.spawn_presence_logger();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let n = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, ConnectionId::new(n));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        info!(addr = %self.local_addr, "Chat server stopped");
        Ok(())
    }

    /// Spawns the handler task for an accepted connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_id: ConnectionId) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = %connection_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            stream,
            peer,
            connection_id,
            self.router.clone(),
            self.cancel_token.child_token(),
        );
        tokio::spawn(handler.run());
    }

    /// Spawns a task that logs every join and leave.
    fn spawn_presence_logger(&self) {
        let mut events = self.router.registry().subscribe();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Presence logger shutting down");
                        break;
                    }

                    result = events.recv() => {
                        match result {
                            Ok(event) => {
                                let change = match event {
                                    PresenceEvent::Joined { .. } => "joined",
                                    PresenceEvent::Left { .. } => "left",
                                };
                                info!(username = %event.username(), online = event.online(), change, "Presence changed");
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Presence logger lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Presence channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
