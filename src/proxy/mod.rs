//! Proxy service module
//!
//! This module implements the relay itself: the listener and accept loop,
//! per-connection TLS termination and upstream dialing, and bidirectional
//! forwarding.

mod forwarder;
mod handler;
pub mod server;
mod stream;

pub use forwarder::{proxy_data, Direction, RelayStats};
pub use handler::{handle_connection, Upstream};
pub use server::Proxy;
pub use stream::RelayStream;
