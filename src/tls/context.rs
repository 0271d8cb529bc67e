//! TLS context construction
//!
//! One context is built for the listening side and one for the upstream
//! side, both from [`SslMaterial`]. Both pin TLS 1.3 as the minimum
//! protocol version. Contexts are immutable once built and are shared by
//! every connection.

use std::fmt;
use std::net::IpAddr;

use log::{info, warn};
use openssl::ssl::{
    Ssl, SslAcceptor, SslContext, SslContextBuilder, SslMethod, SslVerifyMode, SslVersion,
};
use openssl::x509::store::X509StoreBuilder;

use super::cert::{describe_cert, parse_ca_cert, parse_key_pair};
use crate::common::{ProxyError, Result};
use crate::config::SslMaterial;

/// Minimum protocol version for both sides, not configurable
pub const MIN_PROTOCOL_VERSION: SslVersion = SslVersion::TLS1_3;

/// Client certificate verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCertMode {
    /// Require client certificate, connection fails if not provided
    Required,
    /// Verify the client certificate if provided but don't require it
    Optional,
    /// Don't verify client certificates
    None,
}

impl ClientCertMode {
    /// OpenSSL verify flags for a server context using this mode
    pub fn verify_mode(self) -> SslVerifyMode {
        match self {
            Self::Required => SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT,
            Self::Optional => SslVerifyMode::PEER,
            Self::None => SslVerifyMode::NONE,
        }
    }
}

impl fmt::Display for ClientCertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Ready-to-use TLS context for one side of the relay
pub struct TlsContext {
    context: SslContext,
    client_cert_mode: ClientCertMode,
    has_certificate: bool,
}

impl TlsContext {
    /// Underlying OpenSSL context
    pub fn context(&self) -> &SslContext {
        &self.context
    }

    /// Client authentication policy chosen for this context
    pub fn client_cert_mode(&self) -> ClientCertMode {
        self.client_cert_mode
    }

    /// Whether an own certificate is configured
    pub fn has_certificate(&self) -> bool {
        self.has_certificate
    }

    /// New session for an accepted connection
    pub fn server_session(&self) -> Result<Ssl> {
        Ok(Ssl::new(&self.context)?)
    }

    /// New session for dialing `host`
    ///
    /// Sets SNI for DNS names and makes the handshake verify that the
    /// upstream certificate matches `host` (as a DNS name or IP address).
    pub fn client_session(&self, host: &str) -> Result<Ssl> {
        let mut ssl = Ssl::new(&self.context)?;

        match host.parse::<IpAddr>() {
            Ok(ip) => ssl.param_mut().set_ip(ip)?,
            Err(_) => {
                ssl.set_hostname(host)?;
                ssl.param_mut().set_host(host)?;
            }
        }

        Ok(ssl)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("client_cert_mode", &self.client_cert_mode)
            .field("has_certificate", &self.has_certificate)
            .finish_non_exhaustive()
    }
}

/// Install the certificate chain and key, if configured
///
/// Returns whether a certificate was installed.
fn apply_key_pair(builder: &mut SslContextBuilder, material: &SslMaterial, side: &str) -> Result<bool> {
    let Some(pair) = material.key_pair() else {
        return Ok(false);
    };

    let certified = parse_key_pair(&pair.cert_pem, &pair.key_pem).map_err(|e| {
        ProxyError::Certificate(format!("Error loading {} certificate: {}", side, e))
    })?;

    builder.set_certificate(&certified.leaf)?;
    for cert in certified.chain {
        builder.add_extra_chain_cert(cert)?;
    }
    builder.set_private_key(&certified.key)?;
    builder.check_private_key()?;

    info!("Using {} certificate: {}", side, describe_cert(&certified.leaf));
    Ok(true)
}

fn load_ca(material: &SslMaterial, side: &str) -> Result<Option<openssl::x509::X509>> {
    material
        .ca_pem()
        .map(|pem| {
            parse_ca_cert(pem).map_err(|e| {
                ProxyError::Certificate(format!("Error loading {} CA certificate: {}", side, e))
            })
        })
        .transpose()
}

/// Build the listening side context from `local_ssl` material
///
/// Clients are verified if they present a certificate. When a CA is
/// configured, the trust pool becomes exactly that CA and a client
/// certificate is required.
///
/// # Errors
///
/// Returns an error if the certificate, key or CA cannot be parsed.
pub fn build_inbound_context(material: &SslMaterial) -> Result<TlsContext> {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
    builder.set_min_proto_version(Some(MIN_PROTOCOL_VERSION))?;

    let has_certificate = apply_key_pair(&mut builder, material, "local")?;
    if !has_certificate {
        warn!("Local TLS is enabled without a certificate, client handshakes will fail");
    }

    let client_cert_mode = match load_ca(material, "local")? {
        Some(ca) => {
            info!("Local client CA: {}", describe_cert(&ca));
            builder.add_client_ca(&ca)?;
            let mut store = X509StoreBuilder::new()?;
            store.add_cert(ca)?;
            builder.set_cert_store(store.build());
            ClientCertMode::Required
        }
        None => {
            if let Err(e) = builder.set_default_verify_paths() {
                warn!("System trust store unavailable for client verification: {}", e);
            }
            warn!("No local CA configured, anonymous clients are accepted");
            ClientCertMode::Optional
        }
    };
    builder.set_verify(client_cert_mode.verify_mode());

    info!("Local client certificate mode: {}", client_cert_mode);

    Ok(TlsContext {
        context: builder.build().into_context(),
        client_cert_mode,
        has_certificate,
    })
}

/// Build the upstream side context from `server_ssl` material
///
/// The upstream certificate is always verified. The trust pool starts from
/// the system default store (empty if that cannot be loaded) and a
/// configured CA is added to it, never replacing it.
///
/// # Errors
///
/// Returns an error if the certificate, key or CA cannot be parsed.
pub fn build_outbound_context(material: &SslMaterial) -> Result<TlsContext> {
    let mut builder = SslContext::builder(SslMethod::tls_client())?;
    builder.set_min_proto_version(Some(MIN_PROTOCOL_VERSION))?;

    let has_certificate = apply_key_pair(&mut builder, material, "server")?;

    if let Err(e) = builder.set_default_verify_paths() {
        warn!("System trust store unavailable, starting from an empty pool: {}", e);
    }

    let client_cert_mode = match load_ca(material, "server")? {
        Some(ca) => {
            info!("Additional server CA: {}", describe_cert(&ca));
            builder.cert_store_mut().add_cert(ca)?;
            ClientCertMode::Required
        }
        None => ClientCertMode::Optional,
    };

    // A client context always checks the server it dials
    builder.set_verify(SslVerifyMode::PEER);

    Ok(TlsContext {
        context: builder.build(),
        client_cert_mode,
        has_certificate,
    })
}
