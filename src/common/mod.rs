//! Common module
//!
//! This module contains shared errors, logging setup, file helpers and
//! address parsing used throughout the relay.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use self::error::{ProxyError, Result};
pub use self::fs::{check_file_exists, read_file};
pub use self::log::init_logger;
pub use self::net::{parse_local_addr, split_host_port, BindHost, LocalAddr};
