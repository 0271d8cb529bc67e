//! Configuration module
//!
//! This module handles the relay configuration: the JSON schema, defaults,
//! validation, and loading of the certificate material it references.

mod defaults;
mod error;
mod loader;
mod types;
mod validator;

pub use self::defaults::CONNECT_WAIT_TIME_SECS;
pub use self::error::ConfigError;
pub use self::loader::ConfigLoader;
pub use self::types::{ConfigFile, KeyPairPem, ProxySettings, RelayConfig, SslMaterial, SslSettings};
pub use self::validator::ConfigValidator;

use log::info;

fn describe_ssl(material: &SslMaterial) -> String {
    if !material.is_enabled() {
        return "disabled".to_string();
    }

    format!(
        "enabled (certificate: {}, CA: {})",
        if material.key_pair().is_some() { "yes" } else { "no" },
        if material.ca_pem().is_some() { "yes" } else { "no" },
    )
}

/// Log the loaded configuration
pub fn log_config(config: &RelayConfig) {
    // Only log in info level or below
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Relay Configuration ===");
    info!("  Local address: {}", config.proxy.local);
    info!("  Server address: {}", config.proxy.server);
    info!("  Connect wait time: {} seconds", config.proxy.connect_wait_time);
    info!("  Local TLS: {}", describe_ssl(&config.local_ssl));
    info!("  Server TLS: {}", describe_ssl(&config.server_ssl));
    info!("===========================");
}
