//! LSP Infrastructure for Symfold
//!
//! Provides race-safe Language Server Protocol communication:
//! - JSON-RPC 2.0 protocol types
//! - Async message transport with Content-Length framing
//! - RPC session with atomic request IDs and a handler registry
//! - Lifecycle client owning the server process

pub mod client;
pub mod protocol;
pub mod rpc;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{LspClient, SessionState};
pub use rpc::RpcSession;
pub use transport::{MessageReader, MessageWriter};
