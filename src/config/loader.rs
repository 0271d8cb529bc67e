//! Configuration loading
//!
//! Reads the JSON file, validates it and pulls every referenced PEM file
//! into memory. Any failure here aborts startup.

use std::path::Path;

use log::{debug, info};

use super::error::{ConfigError, Result};
use super::types::{ConfigFile, KeyPairPem, RelayConfig, SslMaterial, SslSettings};
use super::validator::ConfigValidator;
use crate::common::fs::read_file;

/// Loads a [`RelayConfig`] from disk
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate the configuration file and its PEM files
    ///
    /// # Parameters
    ///
    /// * `path` - Path to the JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, fails
    /// validation, or names a PEM file that cannot be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());

        let content = read_file("configuration", path)?;
        let file: ConfigFile = serde_json::from_slice(&content).map_err(|e| {
            ConfigError::ParseError(format!("{}: {}", path.display(), e))
        })?;

        Self::from_config_file(file)
    }

    /// Validate an already parsed file and load its PEM material
    pub fn from_config_file(file: ConfigFile) -> Result<RelayConfig> {
        file.validate()?;

        let local_ssl = load_material("local_ssl", &file.local_ssl)?;
        let server_ssl = load_material("server_ssl", &file.server_ssl)?;

        Ok(RelayConfig {
            proxy: file.proxy,
            local_ssl,
            server_ssl,
        })
    }
}

/// Read the PEM files of one side
///
/// A disabled side reads nothing. The validator has already rejected a
/// certificate path without a key path and vice versa.
fn load_material(section: &str, ssl: &SslSettings) -> Result<SslMaterial> {
    if !ssl.enable {
        debug!("{} disabled", section);
        return Ok(SslMaterial::disabled());
    }

    let key_pair = if !ssl.crt_file_path.is_empty() && !ssl.key_file_path.is_empty() {
        let cert_pem = read_file(&format!("{}.crt_file_path", section), Path::new(&ssl.crt_file_path))?;
        let key_pem = read_file(&format!("{}.key_file_path", section), Path::new(&ssl.key_file_path))?;
        debug!("{} certificate loaded from {}", section, ssl.crt_file_path);
        Some(KeyPairPem { cert_pem, key_pem })
    } else {
        None
    };

    // The CA is loaded whether or not a certificate is configured
    let ca_pem = if ssl.ca_file_path.is_empty() {
        None
    } else {
        let ca = read_file(&format!("{}.ca_file_path", section), Path::new(&ssl.ca_file_path))?;
        debug!("{} CA loaded from {}", section, ssl.ca_file_path);
        Some(ca)
    };

    Ok(SslMaterial::enabled(key_pair, ca_pem))
}
