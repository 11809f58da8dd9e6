//! Multi-user chat over WebSocket with a compact binary protocol.
//!
//! The server terminates many concurrent WebSocket connections, keeps
//! authoritative presence for every participant, fans out notifications to
//! the membership, and retains bounded conversation history. The client is a
//! thin terminal front-end that speaks the same binary frames.

pub mod client;
pub mod common;
pub mod protocol;
pub mod server;
