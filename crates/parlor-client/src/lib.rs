//! parlor client - console client library
//!
//! Connects to a parlor server and relays lines in both directions:
//! input lines go to the server, server lines come back as
//! [`ClientEvent`]s for the caller to print.

pub mod client;
pub mod error;

pub use client::{ChatClient, ClientConfig, ClientEvent};
pub use error::{ClientError, Result};
