//! Per-connection session state and outbound delivery.
//!
//! Every accepted connection gets an `Outbound`: a bounded queue drained by
//! a dedicated writer task that owns the socket's write half. Other tasks
//! deliver to a session only through this queue, never by touching the
//! socket. Once the handshake picks a username the outbound is wrapped in a
//! `SessionHandle`, which is what the registry stores.
//!
//! A session is torn down by cancelling its token. That happens when:
//! - the connection's own task decides to disconnect
//! - the writer fails or times out
//! - the queue is full (the client stopped reading)
//! - the server shuts down (session tokens are children of the server's)

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

use parlor_core::{ConnectionId, Username};

/// Lines that may wait in a session's queue before it counts as stalled.
pub const OUTBOUND_BUFFER: usize = 256;

/// Write timeout for a single line (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle of one client connection.
///
/// ```text
/// Connecting ─▶ AwaitingUsername ─▶ Joined ─▶ Disconnecting ─▶ Closed
///      │               │                            ▲
///      └───────────────┴────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, nothing sent yet
    Connecting,
    /// Prompt sent, waiting for the first line
    AwaitingUsername,
    /// Registered and routing chat lines
    Joined,
    /// Transport is being closed
    Disconnecting,
    /// Unregistered; terminal
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, AwaitingUsername)
                | (Connecting, Disconnecting)
                | (AwaitingUsername, Joined)
                | (AwaitingUsername, Disconnecting)
                | (Joined, Disconnecting)
                | (Disconnecting, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::AwaitingUsername => "awaiting-username",
            Self::Joined => "joined",
            Self::Disconnecting => "disconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned when queueing a line for a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session is shutting down or already gone.
    #[error("session {0} is closed")]
    Closed(ConnectionId),

    /// The client stopped reading and its queue filled up.
    #[error("session {id} stalled with {capacity} lines queued")]
    Stalled { id: ConnectionId, capacity: usize },
}

// ============================================================================
// Outbound
// ============================================================================

/// Thread-safe write endpoint of one connection.
///
/// Cloning is cheap; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct Outbound {
    connection_id: ConnectionId,
    sender: mpsc::Sender<String>,
    cancel_token: CancellationToken,
}

impl Outbound {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queues one line (without newline) for delivery.
    ///
    /// Never blocks. A full queue closes the session, since a client that
    /// is that far behind would otherwise hold up every sender.
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` if the session is shutting down
    /// - `SessionError::Stalled` if the queue is full
    pub fn send(&self, line: impl Into<String>) -> Result<(), SessionError> {
        if self.cancel_token.is_cancelled() {
            return Err(SessionError::Closed(self.connection_id));
        }

        match self.sender.try_send(line.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.cancel_token.cancel();
                Err(SessionError::Stalled {
                    id: self.connection_id,
                    capacity: OUTBOUND_BUFFER,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.cancel_token.cancel();
                Err(SessionError::Closed(self.connection_id))
            }
        }
    }

    /// Closes the session. Safe to call any number of times.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once the session has been closed by anyone.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }

    /// A clone of the token that closes this session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Creates the outbound queue for a connection and spawns its writer task.
///
/// The writer exits when the token is cancelled, when every `Outbound`
/// clone has been dropped and the queue is drained, or on the first failed
/// or timed-out write (which also cancels the token).
pub fn open_outbound<W>(
    connection_id: ConnectionId,
    writer: W,
    cancel_token: CancellationToken,
) -> (Outbound, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
    let task = tokio::spawn(write_loop(
        connection_id,
        writer,
        receiver,
        cancel_token.clone(),
    ));

    let outbound = Outbound {
        connection_id,
        sender,
        cancel_token,
    };
    (outbound, task)
}

async fn write_loop<W>(
    connection_id: ConnectionId,
    writer: W,
    mut receiver: mpsc::Receiver<String>,
    cancel_token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    loop {
        let line = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            line = receiver.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match timeout(WRITE_TIMEOUT, write_line(&mut writer, &line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection = %connection_id, error = %e, "Write failed, closing session");
                cancel_token.cancel();
                break;
            }
            Err(_) => {
                debug!(connection = %connection_id, "Write timed out, closing session");
                cancel_token.cancel();
                break;
            }
        }
    }

    // Best effort; the peer may already be gone
    let _ = writer.shutdown().await;
    debug!(connection = %connection_id, "Writer stopped");
}

async fn write_line<W>(writer: &mut BufWriter<W>, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

// ============================================================================
// SessionHandle
// ============================================================================

/// A joined session: a username bound to a connection's outbound queue.
///
/// The username cannot change once the handle exists.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    username: Username,
    outbound: Outbound,
    joined_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn new(username: Username, outbound: Outbound) -> Self {
        Self {
            username,
            outbound,
            joined_at: Utc::now(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.outbound.connection_id()
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// See [`Outbound::send`].
    pub fn send(&self, line: impl Into<String>) -> Result<(), SessionError> {
        self.outbound.send(line)
    }

    /// See [`Outbound::close`].
    pub fn close(&self) {
        self.outbound.close();
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Two handles refer to the same connection.
    pub fn same_connection(&self, other: &SessionHandle) -> bool {
        self.connection_id() == other.connection_id()
    }
}
