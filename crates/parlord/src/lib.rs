//! parlor server - Username registry and message router
//!
//! This crate provides the core infrastructure for the chat server:
//! - `registry` - Actor owning the username -> session directory
//! - `session` - Per-connection outbound queue and lifecycle states
//! - `router` - Decides who receives each line
//! - `sink` - Side channel for relayed chat lines
//! - `server` - TCP listener and per-connection handler
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        parlord                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│     RegistryActor           │   │
//! │  │ (TcpListener)   │     │  (username directory)       │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             ▲                   │
//! │           │ connections                 │ lookups           │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ConnectionHandler│────▶│          Router             │   │
//! │  │  (per client)   │     │ (broadcast / private / cmd) │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ Outbound queues   │
//! │                                         ▼                   │
//! │                              writer task per client         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod sink;
