//! Message routing.
//!
//! The router decides who receives each line a joined client sends:
//!
//! | Line          | Delivered to                                    |
//! |---------------|-------------------------------------------------|
//! | `/quit`       | nobody; the caller disconnects                  |
//! | `/who`        | sender                                          |
//! | `/count`      | sender                                          |
//! | `@user text`  | `user` and the sender (once if they are equal)  |
//! | anything else | every online session, sender included           |
//!
//! Delivery never fails as a whole. A recipient whose queue rejects a line
//! is closed and skipped; its own connection task notices and tears it down.

use parlor_protocol::{Command, Intent, ServerMessage};
use tracing::{debug, warn};

use crate::registry::RegistryHandle;
use crate::session::SessionHandle;
use crate::sink::SharedChatLog;

/// What the connection loop should do after a line has been dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading lines.
    Continue,
    /// The client asked to leave.
    Quit,
}

/// Routes lines between sessions using the registry. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    registry: RegistryHandle,
    log: SharedChatLog,
}

impl Router {
    pub fn new(registry: RegistryHandle, log: SharedChatLog) -> Self {
        Self { registry, log }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Interprets one line from `sender` and delivers the result.
    pub async fn dispatch(&self, line: &str, sender: &SessionHandle) -> Flow {
        match Intent::parse(line) {
            Intent::Command(Command::Quit) => {
                debug!(username = %sender.username(), "Quit requested");
                return Flow::Quit;
            }
            Intent::Command(Command::Who) => {
                let usernames = self.registry.usernames().await;
                reply(sender, ServerMessage::Online(&usernames));
            }
            Intent::Command(Command::Count) => {
                let online = self.registry.count().await;
                reply(sender, ServerMessage::Count(online));
            }
            Intent::Private { target, body } => {
                self.send_private(sender, target, body).await;
            }
            Intent::Broadcast(text) => {
                let line = ServerMessage::Chat {
                    from: sender.username(),
                    text,
                }
                .to_string();
                self.broadcast(&line).await;
            }
        }
        Flow::Continue
    }

    /// Delivers `line` to every online session and records it.
    ///
    /// Returns how many sessions accepted the line.
    pub async fn broadcast(&self, line: &str) -> usize {
        let recipients = self.registry.snapshot().await;
        let delivered = recipients
            .iter()
            .filter(|recipient| deliver(recipient, line))
            .count();

        self.log.record(line);
        debug!(
            recipients = recipients.len(),
            delivered, "Broadcast delivered"
        );
        delivered
    }

    async fn send_private(&self, sender: &SessionHandle, target: &str, body: &str) {
        let Some(recipient) = self.registry.lookup(target).await else {
            debug!(from = %sender.username(), to = target, "Private message target not found");
            reply(sender, ServerMessage::UserNotFound(target));
            return;
        };

        let line = ServerMessage::Private {
            from: sender.username(),
            body,
        }
        .to_string();

        deliver(&recipient, &line);
        if !recipient.same_connection(sender) {
            deliver(sender, &line);
        }
        self.log.record(&line);
    }
}

/// Queues `line` for one recipient, isolating any failure.
fn deliver(recipient: &SessionHandle, line: &str) -> bool {
    if recipient.is_closed() {
        // Its connection task is already tearing it down
        debug!(username = %recipient.username(), "Skipping closing session");
        return false;
    }

    match recipient.send(line) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                username = %recipient.username(),
                error = %e,
                "Dropping line for unreachable session"
            );
            false
        }
    }
}

fn reply(sender: &SessionHandle, message: ServerMessage<'_>) {
    deliver(sender, &message.to_string());
}
