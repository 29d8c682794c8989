//! Username registry using Actor pattern.
//!
//! The registry is the directory of everyone currently online. It receives
//! commands via a tokio mpsc channel and is the single owner of the
//! username -> session mapping, so every operation observes a consistent
//! state without callers taking locks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   PresenceEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   Register/Unregister    BTreeMap<Username,       presence logger,
//!   Lookup/Snapshot         SessionHandle>           tests
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{RegistryActor, MAX_USERS};
pub use commands::{PresenceEvent, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every clone of the returned handle is dropped.
///
/// # Example
///
/// ```no_run
/// use parlord::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     assert_eq!(handle.count().await, 0);
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    spawn_registry_with_capacity(MAX_USERS)
}

/// Spawn a registry that refuses joins beyond `capacity` users.
pub fn spawn_registry_with_capacity(capacity: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), capacity);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
