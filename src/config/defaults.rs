//! Default configuration values
//!
//! Single source of truth for values used when the configuration file
//! leaves an optional field out.

/// Default upstream dial timeout in seconds
pub const CONNECT_WAIT_TIME_SECS: u64 = 30;

/// Default upstream dial timeout
pub fn connect_wait_time() -> u64 {
    CONNECT_WAIT_TIME_SECS
}
