//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `PresenceEvent`: Events published by the registry for subscribers

use parlor_core::{ConnectionId, Username};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::SessionHandle;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command that produces a value carries a oneshot channel for the
/// response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a session under its username.
    ///
    /// Responds with the number of online users including the new one.
    ///
    /// # Errors
    /// - `RegistryError::UsernameTaken` if the name is already online
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Register {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<usize, RegistryError>>,
    },

    /// Remove a username, but only if it still belongs to `connection_id`.
    ///
    /// Absent names are a no-op. Responds with the number of online users
    /// after the removal.
    Unregister {
        username: Username,
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<usize>,
    },

    /// Find the session registered under a name.
    Lookup {
        username: String,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// Point-in-time copy of every registered session, ordered by username.
    Snapshot {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },

    /// Number of registered sessions.
    Count { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has reached its maximum number of users.
    #[error("registry is full (max: {max} users)")]
    RegistryFull {
        /// Maximum number of users allowed
        max: usize,
    },

    /// Another connection is already online under this name.
    #[error("username already taken: {0}")]
    UsernameTaken(Username),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Presence Events
// ============================================================================

/// Events published by the registry after each membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// A user came online.
    Joined {
        username: Username,
        connection_id: ConnectionId,
        /// Online count right after the join
        online: usize,
    },

    /// A user went offline.
    Left {
        username: Username,
        connection_id: ConnectionId,
        /// Online count right after the removal
        online: usize,
    },
}

impl PresenceEvent {
    /// Username the event is about.
    pub fn username(&self) -> &Username {
        match self {
            Self::Joined { username, .. } | Self::Left { username, .. } => username,
        }
    }

    /// Online count carried by the event.
    pub fn online(&self) -> usize {
        match self {
            Self::Joined { online, .. } | Self::Left { online, .. } => *online,
        }
    }
}
