//! Configuration types
//!
//! `ConfigFile` mirrors the JSON document on disk. `RelayConfig` is what the
//! loader produces: the same proxy settings plus the PEM material for each
//! side, already read into memory.

use std::time::Duration;

use serde::Deserialize;

use super::defaults;

/// `proxy` section of the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxySettings {
    /// Local bind address literal (`[ipv6]:port`, `host:port` or `:port`)
    pub local: String,

    /// Upstream address literal, passed to the dialer unparsed
    pub server: String,

    /// Upstream dial timeout in seconds
    #[serde(default = "defaults::connect_wait_time")]
    pub connect_wait_time: u64,
}

impl ProxySettings {
    /// Dial timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_wait_time)
    }
}

/// `local_ssl` / `server_ssl` section of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SslSettings {
    /// Whether TLS is used on this side
    pub enable: bool,
    /// Certificate chain PEM path
    pub crt_file_path: String,
    /// Private key PEM path
    pub key_file_path: String,
    /// CA certificate PEM path
    pub ca_file_path: String,
}

/// Configuration file as written on disk
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigFile {
    /// Addresses and timeouts
    pub proxy: ProxySettings,

    /// TLS settings for the listening side
    #[serde(default)]
    pub local_ssl: SslSettings,

    /// TLS settings for the upstream side
    #[serde(default)]
    pub server_ssl: SslSettings,
}

/// Certificate chain and private key, always present together
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPairPem {
    /// Certificate chain PEM, leaf first
    pub cert_pem: Vec<u8>,
    /// Private key PEM
    pub key_pem: Vec<u8>,
}

// Never print key material
impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// TLS material for one side of the relay, loaded into memory
///
/// The certificate and key live in one `Option<KeyPairPem>`, so a
/// certificate without a key (or the reverse) cannot be represented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslMaterial {
    enable: bool,
    key_pair: Option<KeyPairPem>,
    ca_pem: Option<Vec<u8>>,
}

impl SslMaterial {
    /// Material for a side that speaks plain TCP
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Material for a TLS-enabled side
    ///
    /// # Parameters
    ///
    /// * `key_pair` - Own certificate and key, if any
    /// * `ca_pem` - CA certificate PEM, if any
    pub fn enabled(key_pair: Option<KeyPairPem>, ca_pem: Option<Vec<u8>>) -> Self {
        Self {
            enable: true,
            key_pair,
            ca_pem,
        }
    }

    /// Whether TLS is used on this side
    pub fn is_enabled(&self) -> bool {
        self.enable
    }

    /// Own certificate and key
    pub fn key_pair(&self) -> Option<&KeyPairPem> {
        self.key_pair.as_ref()
    }

    /// CA certificate PEM
    pub fn ca_pem(&self) -> Option<&[u8]> {
        self.ca_pem.as_deref()
    }
}

/// Fully loaded relay configuration
///
/// Built once at startup and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Addresses and timeouts
    pub proxy: ProxySettings,
    /// Material for the listening side
    pub local_ssl: SslMaterial,
    /// Material for the upstream side
    pub server_ssl: SslMaterial,
}
