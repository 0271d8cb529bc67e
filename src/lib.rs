//! mTLS Relay: config-driven TCP relay with optional mutual TLS
//!
//! This library implements a transport-level TCP relay. Either side of the
//! relay can independently speak plain TCP or TLS 1.3, with client
//! certificate authentication, as declared in a static JSON configuration
//! file. Payload bytes are never inspected.
//!
//! # Main Features
//!
//! - TLS termination in front of a plaintext service
//! - TLS origination (optionally with a client certificate) towards a TLS upstream
//! - Client certificate enforcement when a CA is configured
//! - Half-close propagation so a closed side tears the connection down promptly
//!
//! # Example
//!
//! ```no_run
//! use mtls_relay::{ConfigLoader, Proxy, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConfigLoader::load("config.json")?;
//!     let proxy = Proxy::from_config(&config).await?;
//!     proxy.run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_local_addr, ProxyError, Result};
pub use config::{ConfigLoader, RelayConfig};
pub use proxy::Proxy;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
