//! TLS handling module
//!
//! This module builds the TLS contexts for both sides of the relay and
//! provides certificate-related helpers.

mod cert;
mod context;

pub use cert::{describe_cert, get_cert_fingerprint, get_cert_subject, parse_ca_cert, parse_key_pair, CertifiedKey};
pub use context::{build_inbound_context, build_outbound_context, ClientCertMode, TlsContext, MIN_PROTOCOL_VERSION};
