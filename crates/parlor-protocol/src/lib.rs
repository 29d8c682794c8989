//! parlor protocol - Line grammar and server messages
//!
//! The wire format is plain UTF-8 text, one message per `\n`-terminated
//! line, with no framing beyond the newline. This crate provides:
//! - `intent` - how the server interprets a line typed by a client
//! - `message` - every line the server writes back

pub mod intent;
pub mod message;

pub use intent::{Command, Intent};
pub use message::ServerMessage;

/// TCP port used by both the server and the client when none is given.
pub const DEFAULT_PORT: u16 = 12345;
