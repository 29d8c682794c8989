//! Registry actor - owns the username directory and processes commands.
//!
//! The RegistryActor is the single owner of membership state in the server.
//! It receives commands via an mpsc channel and publishes presence events
//! via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)
//! - Event publish failures are ignored (no subscribers)

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use parlor_core::{ConnectionId, Username};

use super::commands::{PresenceEvent, RegistryCommand, RegistryError};
use crate::session::SessionHandle;

/// Default maximum number of users online at once.
pub const MAX_USERS: usize = 1024;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns the username -> session mapping.
///
/// Commands are processed one at a time in a single task, so register,
/// unregister, lookup and snapshot never observe a half-applied change.
/// Keys are kept sorted, which makes `/who` listings deterministic.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Everyone currently online
    sessions: BTreeMap<Username, SessionHandle>,

    /// Maximum number of entries
    capacity: usize,

    /// Presence event publisher
    event_publisher: broadcast::Sender<PresenceEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for presence events
    /// * `capacity` - Maximum number of users online at once
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<PresenceEvent>,
        capacity: usize,
    ) -> Self {
        Self {
            receiver,
            sessions: BTreeMap::new(),
            capacity,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!(capacity = self.capacity, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(users = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                session,
                respond_to,
            } => {
                let result = self.handle_register(session);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unregister {
                username,
                connection_id,
                respond_to,
            } => {
                let online = self.handle_unregister(username, connection_id);
                let _ = respond_to.send(online);
            }
            RegistryCommand::Lookup {
                username,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.get(username.as_str()).cloned());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.sessions.values().cloned().collect());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(&mut self, session: SessionHandle) -> Result<usize, RegistryError> {
        if self.sessions.len() >= self.capacity {
            warn!(
                username = %session.username(),
                current = self.sessions.len(),
                max = self.capacity,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull { max: self.capacity });
        }

        let username = session.username().clone();
        let connection_id = session.connection_id();

        match self.sessions.entry(username.clone()) {
            Entry::Occupied(existing) => {
                debug!(
                    username = %username,
                    holder = %existing.get().connection_id(),
                    requester = %connection_id,
                    "Username already online"
                );
                return Err(RegistryError::UsernameTaken(username));
            }
            Entry::Vacant(slot) => {
                slot.insert(session);
            }
        }

        let online = self.sessions.len();
        debug!(username = %username, connection = %connection_id, online, "User registered");

        // Ignore send error - no subscribers is fine
        let _ = self.event_publisher.send(PresenceEvent::Joined {
            username,
            connection_id,
            online,
        });

        Ok(online)
    }

    fn handle_unregister(&mut self, username: Username, connection_id: ConnectionId) -> usize {
        let owned = self
            .sessions
            .get(&username)
            .is_some_and(|session| session.connection_id() == connection_id);

        if !owned {
            debug!(
                username = %username,
                connection = %connection_id,
                "Unregister ignored, name not held by this connection"
            );
            return self.sessions.len();
        }

        self.sessions.remove(&username);
        let online = self.sessions.len();
        debug!(username = %username, connection = %connection_id, online, "User unregistered");

        let _ = self.event_publisher.send(PresenceEvent::Left {
            username,
            connection_id,
            online,
        });

        online
    }
}
