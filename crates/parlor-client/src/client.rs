//! Chat connection client.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the server over TCP
//! - Answering the username prompt when a name was given up front
//! - Relaying input lines to the server and server lines to the caller
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use parlor_protocol::{Command, Intent, DEFAULT_PORT};

/// How long to keep printing server lines after the user has left.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the chat client.
///
/// # Example
///
/// ```rust
/// use parlor_client::ClientConfig;
///
/// let config = ClientConfig {
///     host: "chat.example.net".to_string(),
///     username: Some("alice".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(config.addr(), "chat.example.net:12345");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Name sent in answer to the prompt. When `None`, the first input
    /// line answers it instead.
    pub username: Option<String>,
}

impl ClientConfig {
    /// `host:port` as passed to the resolver.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: None,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// What the client reports back to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// TCP connection established.
    Connected { addr: String },
    /// A line sent by the server.
    Line(String),
    /// The server closed the connection.
    Disconnected,
}

// ============================================================================
// Chat Client
// ============================================================================

/// Client for one chat session.
///
/// # Session Lifecycle
///
/// 1. Connects to `host:port`
/// 2. Sends the configured username, if any
/// 3. Forwards server lines and input lines until `/quit`, end of input,
///    server disconnect or cancellation
/// 4. After a local exit, keeps printing until the server hangs up
///
/// # Example
///
/// ```rust,ignore
/// use parlor_client::{ChatClient, ClientConfig};
/// use tokio::io::{stdin, BufReader};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// let (tx, rx) = mpsc::unbounded_channel();
/// let client = ChatClient::new(ClientConfig::default(), tx, CancellationToken::new());
/// client.run(BufReader::new(stdin())).await?;
/// ```
pub struct ChatClient {
    /// Connection settings.
    config: ClientConfig,

    /// Channel to report events to the caller.
    event_tx: mpsc::UnboundedSender<ClientEvent>,

    /// Cancellation token for shutdown.
    cancel_token: CancellationToken,
}

impl ChatClient {
    /// Creates a new chat client.
    ///
    /// # Arguments
    ///
    /// * `config` - Server address and optional username
    /// * `event_tx` - Channel receiving connection events and server lines
    /// * `cancel_token` - Token for signaling shutdown
    #[must_use]
    pub fn new(
        config: ClientConfig,
        event_tx: mpsc::UnboundedSender<ClientEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel_token,
        }
    }

    /// Runs one session, reading user input from `input`.
    ///
    /// Returns `Ok(())` when the session ends normally, whichever side
    /// ended it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connect` if the server cannot be reached and
    /// `ClientError::Io` if reading input or writing to the server fails.
    pub async fn run<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let addr = self.config.addr();
        let stream = TcpStream::connect(addr.as_str())
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %addr, "Connected to server");
        self.emit(ClientEvent::Connected { addr });

        let (reader, mut writer) = stream.into_split();
        let mut server_lines = BufReader::new(reader).lines();
        let mut input_lines = input.lines();

        if let Some(username) = &self.config.username {
            send_line(&mut writer, username).await?;
        }

        let left_locally = loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Client cancelled");
                    return Ok(());
                }

                result = server_lines.next_line() => match result {
                    Ok(Some(line)) => self.emit(ClientEvent::Line(line)),
                    Ok(None) => break false,
                    Err(e) => {
                        debug!(error = %e, "Read from server failed");
                        break false;
                    }
                },

                result = input_lines.next_line() => match result? {
                    Some(line) => {
                        send_line(&mut writer, &line).await?;
                        if matches!(Intent::parse(&line), Intent::Command(Command::Quit)) {
                            break true;
                        }
                    }
                    None => {
                        debug!("End of input");
                        break true;
                    }
                },
            }
        };

        if left_locally {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Failed to close write side");
            }
            self.drain(&mut server_lines).await;
        }

        self.emit(ClientEvent::Disconnected);
        Ok(())
    }

    /// Forwards whatever the server still sends until it hangs up.
    async fn drain(&self, server_lines: &mut Lines<BufReader<OwnedReadHalf>>) {
        let drained = timeout(DRAIN_TIMEOUT, async {
            while let Ok(Some(line)) = server_lines.next_line().await {
                self.emit(ClientEvent::Line(line));
            }
        })
        .await;

        if drained.is_err() {
            warn!("Server did not close the connection in time");
        }
    }

    fn emit(&self, event: ClientEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.username.is_none());
    }

    #[test]
    fn test_addr_format() {
        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 4000,
            username: None,
        };
        assert_eq!(config.addr(), "127.0.0.1:4000");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then release it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: None,
        };
        let client = ChatClient::new(config, tx, CancellationToken::new());

        let result = client.run(tokio::io::empty()).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_lines_become_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"Enter your username:\n").await.unwrap();
            // Close right away; the client sees end of stream
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: None,
        };
        let client = ChatClient::new(config, tx, CancellationToken::new());

        // Input never ends, so only the server can end the session
        let (_keep_open, input) = tokio::io::duplex(64);
        client.run(BufReader::new(input)).await.unwrap();
        server.await.unwrap();

        assert!(matches!(rx.recv().await, Some(ClientEvent::Connected { .. })));
        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Line("Enter your username:".to_string()))
        );
        assert_eq!(rx.recv().await, Some(ClientEvent::Disconnected));
    }
}
