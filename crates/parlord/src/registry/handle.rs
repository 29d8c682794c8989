//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to presence events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`, or to an
//!   empty answer for read-only queries

use tokio::sync::{broadcast, mpsc, oneshot};

use parlor_core::{ConnectionId, Username};

use super::commands::{PresenceEvent, RegistryCommand, RegistryError};
use crate::session::SessionHandle;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let online = registry.register(session).await?;
/// if let Some(target) = registry.lookup("bob").await {
///     target.send("hi")?;
/// }
/// let online = registry.unregister(&username, connection_id).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to presence changes
    event_sender: broadcast::Sender<PresenceEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for subscribing to events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<PresenceEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a session under its username.
    ///
    /// Returns the number of online users including this one.
    ///
    /// # Errors
    ///
    /// - `RegistryError::UsernameTaken` if the name is already online
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, session: SessionHandle) -> Result<usize, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove `username` if it is still held by `connection_id`.
    ///
    /// Removing a name that is absent (or now held by someone else) is a
    /// no-op. Returns the number of online users afterwards.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unregister(
        &self,
        username: &Username,
        connection_id: ConnectionId,
    ) -> Result<usize, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Unregister {
                username: username.clone(),
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Find the session registered under `username`.
    ///
    /// Returns `None` if nobody holds the name or if communication
    /// with the actor fails.
    pub async fn lookup(&self, username: &str) -> Option<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Lookup {
                username: username.to_string(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Point-in-time copy of every online session, ordered by username.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Names of everyone online, ordered.
    pub async fn usernames(&self) -> Vec<Username> {
        self.snapshot()
            .await
            .into_iter()
            .map(|session| session.username().clone())
            .collect()
    }

    /// Number of users online.
    ///
    /// Returns 0 if communication with the actor fails.
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Count { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribe to presence events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.event_sender.subscribe()
    }
}
