//! Client line grammar.
//!
//! Each line a joined client sends is one of:
//!
//! ```text
//! /quit            leave the chat
//! /who             list online usernames
//! /count           number of online users
//! @user text       private message to `user`
//! anything else    broadcast to everyone
//! ```
//!
//! Commands match the whole line, ignoring ASCII case. Everything that is
//! not a command or a well-formed private message is a broadcast, including
//! blank lines and a lone `@name` without a body.

/// Commands answered by the server without relaying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/who`
    Who,
    /// `/count`
    Count,
    /// `/quit`
    Quit,
}

impl Command {
    /// The literal a client types for this command.
    pub fn literal(self) -> &'static str {
        match self {
            Self::Who => "/who",
            Self::Count => "/count",
            Self::Quit => "/quit",
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        [Self::Quit, Self::Who, Self::Count]
            .into_iter()
            .find(|cmd| line.eq_ignore_ascii_case(cmd.literal()))
    }
}

/// Parsed meaning of one client line. Borrows from the line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent<'a> {
    /// Relay `text` to every online user.
    Broadcast(&'a str),

    /// Deliver `body` to `target` only (and echo it to the sender).
    Private {
        /// Username between `@` and the first space
        target: &'a str,
        /// Everything after the first space, verbatim
        body: &'a str,
    },

    /// Reply to the sender only.
    Command(Command),
}

impl<'a> Intent<'a> {
    /// Classifies a line. The line must already have its terminator removed.
    pub fn parse(line: &'a str) -> Self {
        if let Some(cmd) = Command::from_line(line) {
            return Self::Command(cmd);
        }

        if let Some((target, body)) = line.strip_prefix('@').and_then(|rest| rest.split_once(' ')) {
            if !target.is_empty() {
                return Self::Private { target, body };
            }
        }

        Self::Broadcast(line)
    }
}
