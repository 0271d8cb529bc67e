//! Network address helpers
//!
//! `proxy.local` is parsed into a bind host and port here. Three forms are
//! accepted, tried in this order:
//!
//! 1. `[<ipv6>]:<port>`
//! 2. `<host>:<port>` (IPv4 literal or host name, no colons or brackets)
//! 3. `:<port>` (all interfaces, IPv4 and IPv6)
//!
//! `proxy.server` is never resolved here; it is handed to the dialer as-is.
//! [`split_host_port`] only extracts the host for TLS name verification.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;

use crate::config::ConfigError;

/// Host part of the local bind address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindHost {
    /// Bind all interfaces, dual-stack where available
    Any,
    /// Bracketed IPv6 literal
    Ipv6(Ipv6Addr),
    /// IPv4 literal or host name
    Host(String),
}

impl fmt::Display for BindHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "[{}]", Ipv6Addr::UNSPECIFIED),
            Self::Ipv6(ip) => write!(f, "[{}]", ip),
            Self::Host(host) => write!(f, "{}", host),
        }
    }
}

/// Resolved local bind address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddr {
    /// Bind host
    pub host: BindHost,
    /// Bind port, never zero when produced by [`parse_local_addr`]
    pub port: u16,
}

impl LocalAddr {
    /// Host string suitable for `TcpListener::bind((host, port))`
    ///
    /// The wildcard maps to `::`; see [`LocalAddr::wildcard_addrs`] for how
    /// it is actually bound.
    pub fn bind_host(&self) -> String {
        match &self.host {
            BindHost::Any => Ipv6Addr::UNSPECIFIED.to_string(),
            BindHost::Ipv6(ip) => ip.to_string(),
            BindHost::Host(host) => host.clone(),
        }
    }
}

impl LocalAddr {
    /// Wildcard socket addresses, dual-stack IPv6 first then IPv4
    ///
    /// Returns `None` unless the host is [`BindHost::Any`].
    pub fn wildcard_addrs(&self) -> Option<(SocketAddr, SocketAddr)> {
        match self.host {
            BindHost::Any => Some((
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, self.port)),
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)),
            )),
            _ => None,
        }
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a port made only of ASCII digits, in `1..=65535`
fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match s.parse::<u32>() {
        Ok(n) if n > 0 && n <= u16::MAX as u32 => Some(n as u16),
        _ => None,
    }
}

fn parse_bracketed_ipv6(literal: &str) -> Option<LocalAddr> {
    let rest = literal.strip_prefix('[')?;
    let (host, port) = rest.split_once("]:")?;
    let ip = host.parse::<Ipv6Addr>().ok()?;

    Some(LocalAddr {
        host: BindHost::Ipv6(ip),
        port: parse_port(port)?,
    })
}

fn parse_host_port(literal: &str) -> Option<LocalAddr> {
    let (host, port) = literal.split_once(':')?;
    let valid_host = !host.is_empty()
        && !host.contains(['[', ']', ':'])
        && !host.chars().any(char::is_whitespace);
    if !valid_host {
        return None;
    }

    Some(LocalAddr {
        host: BindHost::Host(host.to_string()),
        port: parse_port(port)?,
    })
}

fn parse_any_port(literal: &str) -> Option<LocalAddr> {
    let port = literal.strip_prefix(':')?;

    Some(LocalAddr {
        host: BindHost::Any,
        port: parse_port(port)?,
    })
}

/// Parse the `proxy.local` literal into a bind address
///
/// # Parameters
///
/// * `literal` - Address literal from the configuration file
///
/// # Returns
///
/// Returns the bind host and port of the first matching form.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when no form matches or the port is
/// outside `1..=65535`.
pub fn parse_local_addr(literal: &str) -> Result<LocalAddr, ConfigError> {
    debug!("Parsing local address: {}", literal);

    if let Some(addr) = parse_bracketed_ipv6(literal)
        .or_else(|| parse_host_port(literal))
        .or_else(|| parse_any_port(literal))
    {
        return Ok(addr);
    }

    // Give a precise message when only the port is wrong
    let reason = match literal.rsplit_once(':') {
        Some((_, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) && parse_port(port).is_none() => {
            format!("port {} is outside the range 1-65535", port)
        }
        _ => format!("'{}' is not one of [ipv6]:port, host:port or :port", literal),
    };

    Err(ConfigError::InvalidValue("proxy.local".to_string(), reason))
}

/// Split an upstream `host:port` literal
///
/// Accepts `[ipv6]:port` and `host:port`. Brackets are removed from the
/// returned host. The host must not be empty because it is needed for TLS
/// server name verification.
pub fn split_host_port(literal: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::InvalidValue("proxy.server".to_string(), format!("'{}': {}", literal, reason))
    };

    let (host, port) = match literal.strip_prefix('[') {
        Some(rest) => {
            let (host, port) = rest.split_once("]:").ok_or_else(|| invalid("missing ']:' after IPv6 host"))?;
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(invalid("bracketed host is not an IPv6 address"));
            }
            (host, port)
        }
        None => {
            let (host, port) = literal.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if host.contains(':') {
                return Err(invalid("IPv6 hosts must be written as [addr]:port"));
            }
            (host, port)
        }
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let port = parse_port(port).ok_or_else(|| invalid("port must be an integer in 1-65535"))?;
    Ok((host.to_string(), port))
}
