//! Configuration validation
//!
//! Checks everything that can be checked without touching the file system,
//! so a bad configuration fails before any certificate is read.

use super::error::{ConfigError, Result};
use super::types::{ConfigFile, SslSettings};
use crate::common::net::{parse_local_addr, split_host_port};

/// Trait for validating configuration
pub trait ConfigValidator {
    /// Validate the configuration
    fn validate(&self) -> Result<()>;
}

impl ConfigValidator for ConfigFile {
    fn validate(&self) -> Result<()> {
        if self.proxy.server.is_empty() {
            return Err(ConfigError::MissingRequiredValue("proxy.server".to_string()));
        }
        split_host_port(&self.proxy.server)?;

        if self.proxy.local.is_empty() {
            return Err(ConfigError::MissingRequiredValue("proxy.local".to_string()));
        }
        parse_local_addr(&self.proxy.local)?;

        if self.proxy.connect_wait_time == 0 {
            return Err(ConfigError::InvalidValue(
                "proxy.connect_wait_time".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        validate_ssl("local_ssl", &self.local_ssl)?;
        validate_ssl("server_ssl", &self.server_ssl)?;

        Ok(())
    }
}

/// Certificate and key must be given together
fn validate_ssl(section: &str, ssl: &SslSettings) -> Result<()> {
    if !ssl.enable {
        return Ok(());
    }

    match (ssl.crt_file_path.is_empty(), ssl.key_file_path.is_empty()) {
        (true, false) => Err(ConfigError::InvalidCombination(format!(
            "{}.crt_file_path is empty, crt and key must be set together",
            section
        ))),
        (false, true) => Err(ConfigError::InvalidCombination(format!(
            "{}.key_file_path is empty, crt and key must be set together",
            section
        ))),
        _ => Ok(()),
    }
}
