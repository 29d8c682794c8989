//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Sends the username prompt and performs the handshake
//! - Registers the session and announces the join
//! - Reads lines and hands them to the router
//! - Tears the session down and announces the leave
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parlor_core::{ConnectionId, Username};
use parlor_protocol::ServerMessage;

use crate::registry::RegistryError;
use crate::router::{Flow, Router};
use crate::session::{open_outbound, Outbound, SessionHandle, SessionState};

/// Maximum accepted line length in bytes (64 KiB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Names tried for one handshake before giving up.
const MAX_NAME_ATTEMPTS: u32 = 32;

/// How long queued lines may take to flush when a connection closes
/// without having joined.
const CLOSE_LINGER: Duration = Duration::from_secs(2);

/// Why a joined session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client sent `/quit`
    Quit,
    /// Client closed its side of the connection
    Eof,
    /// Reading failed (reset, ...)
    ReadError,
    /// Client sent a line longer than `MAX_LINE_LENGTH`
    LineTooLong,
    /// Session was closed from elsewhere (write failure, stall, shutdown)
    Closed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Quit => "quit",
            Self::Eof => "end of stream",
            Self::ReadError => "read error",
            Self::LineTooLong => "line too long",
            Self::Closed => "closed",
        };
        f.write_str(reason)
    }
}

/// One read from the client.
enum Inbound {
    /// A complete line, decoded lossily and without its terminator
    Line(String),
    /// Client closed its side
    Eof,
    /// More than `MAX_LINE_LENGTH` bytes without a newline
    TooLong,
    /// Transport failure
    Failed(std::io::Error),
}

/// First input of the handshake.
enum HandshakeInput {
    Line(String),
    /// Connection ended before any line arrived
    Dropped,
    /// Session closed from elsewhere while waiting
    Closed,
}

/// Connection handler for a single client.
///
/// Owns the read half of the socket. The write half belongs to the
/// session's writer task and is reached through `outbound`.
pub struct ConnectionHandler {
    /// Newline-delimited frames from the socket's read half
    frames: FramedRead<OwnedReadHalf, AnyDelimiterCodec>,

    /// Queue feeding this connection's writer task
    outbound: Outbound,

    /// Writer task draining `outbound`
    writer_task: JoinHandle<()>,

    /// Routes dispatched lines
    router: Router,

    /// Unique identifier for this connection
    connection_id: ConnectionId,

    /// Remote address, for logging
    peer: SocketAddr,

    /// Current lifecycle state
    state: SessionState,
}

impl ConnectionHandler {
    /// Creates a new connection handler and starts its writer task.
    ///
    /// # Arguments
    ///
    /// * `stream` - Accepted TCP stream
    /// * `peer` - Remote address of the stream
    /// * `connection_id` - Unique identifier for this connection
    /// * `router` - Router shared by all connections
    /// * `cancel_token` - Token that closes this session
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        connection_id: ConnectionId,
        router: Router,
        cancel_token: CancellationToken,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        let (outbound, writer_task) = open_outbound(connection_id, writer, cancel_token);

        Self {
            frames: FramedRead::new(reader, line_codec()),
            outbound,
            writer_task,
            router,
            connection_id,
            peer,
            state: SessionState::Connecting,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Performs the handshake, routes lines until the client leaves or the
    /// connection fails, then unregisters and announces the leave.
    pub async fn run(mut self) {
        debug!(connection = %self.connection_id, peer = %self.peer, "New client connected");

        self.advance(SessionState::AwaitingUsername);
        if let Err(e) = self.outbound.send(ServerMessage::UsernamePrompt.to_string()) {
            debug!(connection = %self.connection_id, error = %e, "Could not send prompt");
            self.abandon().await;
            return;
        }

        let requested = match self.read_username().await {
            HandshakeInput::Line(line) => Some(line),
            HandshakeInput::Dropped => None,
            HandshakeInput::Closed => {
                self.abandon().await;
                return;
            }
        };

        let session = match self.join(requested.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(connection = %self.connection_id, error = %e, "Join failed");
                if matches!(e, ConnectionError::Registry(RegistryError::RegistryFull { .. })) {
                    let _ = self.outbound.send(ServerMessage::ServerFull.to_string());
                }
                self.abandon().await;
                return;
            }
        };

        let reason = self.process_lines(&session).await;
        self.leave(&session, reason).await;
    }

    /// Reads the first line, which names the user.
    async fn read_username(&mut self) -> HandshakeInput {
        let inbound = tokio::select! {
            _ = self.outbound.closed() => return HandshakeInput::Closed,
            inbound = next_inbound(&mut self.frames) => inbound,
        };

        match inbound {
            Inbound::Line(line) => HandshakeInput::Line(line),
            Inbound::Eof => {
                debug!(connection = %self.connection_id, "Connection closed during handshake");
                HandshakeInput::Dropped
            }
            Inbound::TooLong => {
                debug!(connection = %self.connection_id, "Username line too long");
                HandshakeInput::Dropped
            }
            Inbound::Failed(e) => {
                debug!(connection = %self.connection_id, error = %e, "Read failed during handshake");
                HandshakeInput::Dropped
            }
        }
    }

    /// Registers the session under the requested name, or a variant of it.
    ///
    /// A blank or missing name gets a generated fallback. A taken name is
    /// retried as `name_2`, `name_3`, ... and the client is told which name
    /// it ended up with. On success the join is announced to everyone,
    /// including the new session.
    async fn join(&mut self, requested: Option<&str>) -> Result<SessionHandle, ConnectionError> {
        let desired = requested.and_then(|raw| Username::parse(raw).ok());
        let mut candidate = desired.clone().unwrap_or_else(Username::fallback);

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let session = SessionHandle::new(candidate.clone(), self.outbound.clone());

            match self.router.registry().register(session.clone()).await {
                Ok(online) => {
                    self.advance(SessionState::Joined);
                    info!(
                        connection = %self.connection_id,
                        peer = %self.peer,
                        username = %candidate,
                        "Client joined"
                    );

                    let notice = ServerMessage::Joined {
                        username: &candidate,
                        online,
                    }
                    .to_string();
                    self.router.broadcast(&notice).await;

                    if let Some(requested) = desired.as_ref().filter(|name| **name != candidate) {
                        let notice = ServerMessage::Renamed {
                            requested,
                            assigned: &candidate,
                        };
                        // A failed send closes the session; the line loop exits right away
                        if let Err(e) = session.send(notice.to_string()) {
                            debug!(connection = %self.connection_id, error = %e, "Could not send rename notice");
                        }
                    }

                    return Ok(session);
                }
                Err(RegistryError::UsernameTaken(taken)) => {
                    debug!(connection = %self.connection_id, username = %taken, attempt, "Username taken");
                    candidate = match &desired {
                        Some(name) => name.with_suffix(attempt + 1),
                        None => Username::fallback(),
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConnectionError::NoUsernameAvailable {
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    /// Main line loop for a joined session.
    async fn process_lines(&mut self, session: &SessionHandle) -> DisconnectReason {
        loop {
            let inbound = tokio::select! {
                _ = self.outbound.closed() => return DisconnectReason::Closed,
                inbound = next_inbound(&mut self.frames) => inbound,
            };

            let line = match inbound {
                Inbound::Line(line) => line,
                Inbound::Eof => return DisconnectReason::Eof,
                Inbound::TooLong => {
                    warn!(
                        username = %session.username(),
                        max = MAX_LINE_LENGTH,
                        "Line too long, closing connection"
                    );
                    return DisconnectReason::LineTooLong;
                }
                Inbound::Failed(e) => {
                    debug!(username = %session.username(), error = %e, "Read failed");
                    return DisconnectReason::ReadError;
                }
            };

            if self.router.dispatch(&line, session).await == Flow::Quit {
                return DisconnectReason::Quit;
            }
        }
    }

    /// Closes the transport, unregisters and announces the leave.
    async fn leave(mut self, session: &SessionHandle, reason: DisconnectReason) {
        self.advance(SessionState::Disconnecting);
        self.outbound.close();

        let registry = self.router.registry();
        match registry.unregister(session.username(), self.connection_id).await {
            Ok(online) => {
                let notice = ServerMessage::Left {
                    username: session.username(),
                    online,
                }
                .to_string();
                self.router.broadcast(&notice).await;
            }
            Err(e) => {
                warn!(username = %session.username(), error = %e, "Failed to unregister");
            }
        }

        self.advance(SessionState::Closed);
        let online_secs = (Utc::now() - session.joined_at()).num_seconds();
        info!(
            connection = %self.connection_id,
            username = %session.username(),
            reason = %reason,
            online_secs,
            "Client disconnected"
        );
    }

    /// Closes a connection that never joined, flushing any queued notice.
    async fn abandon(mut self) {
        self.advance(SessionState::Disconnecting);

        let cancel_token = self.outbound.cancel_token();
        drop(self.outbound);
        if timeout(CLOSE_LINGER, &mut self.writer_task).await.is_err() {
            cancel_token.cancel();
        }

        self.state = SessionState::Closed;
        debug!(connection = %self.connection_id, "Client disconnected before joining");
    }

    /// Moves to `next`, logging the step.
    fn advance(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(
                connection = %self.connection_id,
                from = %self.state,
                to = %next,
                "Unexpected session state transition"
            );
        }
        debug!(connection = %self.connection_id, from = %self.state, to = %next, "Session state");
        self.state = next;
    }
}

/// Reads the next line. Cancel safe: partial input stays buffered.
async fn next_inbound(frames: &mut FramedRead<OwnedReadHalf, AnyDelimiterCodec>) -> Inbound {
    match frames.next().await {
        Some(Ok(frame)) => Inbound::Line(decode_line(&frame)),
        None => Inbound::Eof,
        Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => Inbound::TooLong,
        Some(Err(AnyDelimiterCodecError::Io(e))) => Inbound::Failed(e),
    }
}

/// Splits on `\n`, refusing to buffer more than `MAX_LINE_LENGTH` bytes.
fn line_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH)
}

/// Drops a trailing `\r` and replaces invalid UTF-8 with U+FFFD.
fn decode_line(frame: &[u8]) -> String {
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    String::from_utf8_lossy(frame).into_owned()
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("No free username after {attempts} attempts")]
    NoUsernameAvailable { attempts: u32 },
}
