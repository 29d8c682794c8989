//! Lines the server writes to clients.
//!
//! Every outbound line is rendered through `ServerMessage` so the exact
//! text of notices lives in one place.

use std::fmt;

use parlor_core::Username;

/// A single line sent by the server, without its trailing newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage<'a> {
    /// Sent once, right after accept.
    UsernamePrompt,

    /// Requested name was taken; the client was given another.
    Renamed {
        requested: &'a Username,
        assigned: &'a Username,
    },

    /// Registry is at capacity; the connection is about to close.
    ServerFull,

    /// Presence notice broadcast after a successful join.
    Joined { username: &'a Username, online: usize },

    /// Presence notice broadcast after a session is torn down.
    Left { username: &'a Username, online: usize },

    /// Reply to `/who`.
    Online(&'a [Username]),

    /// Reply to `/count`.
    Count(usize),

    /// Ordinary chat line relayed to everyone.
    Chat { from: &'a Username, text: &'a str },

    /// Private message, delivered to the target and echoed to the sender.
    Private { from: &'a Username, body: &'a str },

    /// Private message target is not online.
    UserNotFound(&'a str),
}

impl fmt::Display for ServerMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePrompt => f.write_str("Enter your username:"),
            Self::Renamed {
                requested,
                assigned,
            } => write!(
                f,
                "⚠️ Username {requested} is already taken. You are {assigned}."
            ),
            Self::ServerFull => f.write_str("❌ Server is full, try again later."),
            Self::Joined { username, online } => {
                write!(f, "🔔 {username} joined the chat. 👥 ({online} online)")
            }
            Self::Left { username, online } => {
                write!(f, "🔕 {username} left the chat. 👥 ({online} online)")
            }
            Self::Online(usernames) => {
                f.write_str("👥 Online: ")?;
                for (i, name) in usernames.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(name.as_str())?;
                }
                Ok(())
            }
            Self::Count(online) => write!(f, "📊 Members online: {online}"),
            Self::Chat { from, text } => write!(f, "{from}: {text}"),
            Self::Private { from, body } => write!(f, "🕵️ (PM) {from}: {body}"),
            Self::UserNotFound(target) => write!(f, "❌ User not found: {target}"),
        }
    }
}
