//! Error types for the parlor client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

/// Client errors.
///
/// A server that closes the connection is not an error; it ends the
/// session with [`crate::ClientEvent::Disconnected`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not open the TCP connection.
    ///
    /// Usually the server is not running or the host/port is wrong.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Reading input or writing to the server failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
