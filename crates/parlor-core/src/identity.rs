//! Type-safe identifiers for connected users.

use std::borrow::Borrow;
use std::fmt;

use rand::Rng;

use crate::{DomainError, DomainResult};

// ============================================================================
// Username
// ============================================================================

/// Prefix of generated usernames for clients that did not pick one.
pub const FALLBACK_PREFIX: &str = "User";

/// Generated usernames carry a number in `0..FALLBACK_RANGE`.
pub const FALLBACK_RANGE: u32 = 1000;

/// Name a client is known by while connected.
///
/// Always non-blank and trimmed of surrounding whitespace. Comparison is
/// case-sensitive, so `alice` and `Alice` are distinct users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Username(String);

impl Username {
    /// Parses the handshake line a client sent as its desired name.
    ///
    /// # Errors
    ///
    /// - `DomainError::BlankUsername` if nothing remains after trimming
    /// - `DomainError::MultilineUsername` if the name spans several lines
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::BlankUsername);
        }
        if trimmed.contains(['\n', '\r']) {
            return Err(DomainError::MultilineUsername(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generates a fallback name such as `User417`.
    ///
    /// The number is random and not checked against anyone; callers that
    /// need uniqueness must retry on collision.
    pub fn fallback() -> Self {
        Self::fallback_with(&mut rand::thread_rng())
    }

    /// Generates a fallback name from the given random source.
    pub fn fallback_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let n = rng.gen_range(0..FALLBACK_RANGE);
        Self(format!("{FALLBACK_PREFIX}{n}"))
    }

    /// Returns `name_N`, used to disambiguate a name that is already taken.
    #[must_use]
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}_{n}", self.0))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Identifier of one accepted connection, unique for the server's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
