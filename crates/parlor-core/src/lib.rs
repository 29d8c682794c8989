//! parlor core - Shared types for the chat server and client
//!
//! This crate provides the domain types shared between the server
//! (parlord), the line protocol and the console client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use identity::{ConnectionId, Username, FALLBACK_PREFIX, FALLBACK_RANGE};
