//! File system helpers
//!
//! Small wrappers that attach the configuration field and path to read
//! failures, so startup errors say which file was wrong.

use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// Check that `path` exists and is a regular file
///
/// # Parameters
///
/// * `field` - Configuration field the path came from
/// * `path` - File path
pub fn check_file_exists(field: &str, path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileRead {
            field: field.to_string(),
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    if !path.is_file() {
        return Err(ConfigError::FileRead {
            field: field.to_string(),
            path: path.to_path_buf(),
            reason: "path is not a file".to_string(),
        });
    }

    Ok(())
}

/// Read a whole file into memory
///
/// # Returns
///
/// Returns the file content as a byte vector.
pub fn read_file(field: &str, path: &Path) -> Result<Vec<u8>, ConfigError> {
    check_file_exists(field, path)?;

    fs::read(path).map_err(|e| ConfigError::FileRead {
        field: field.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
