//! Certificate handling module
//!
//! PEM parsing for key pairs and CA certificates, plus helpers that turn a
//! certificate into something worth logging.

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509Ref};

use crate::common::{ProxyError, Result};

/// Parsed certificate chain and matching private key
pub struct CertifiedKey {
    /// Leaf certificate
    pub leaf: X509,
    /// Intermediate certificates following the leaf
    pub chain: Vec<X509>,
    /// Private key of the leaf
    pub key: PKey<Private>,
}

/// Parse a PEM certificate chain and private key
///
/// The first certificate in `cert_pem` is the leaf; any further ones are
/// sent as the chain. The key must belong to the leaf.
///
/// # Errors
///
/// Returns `ProxyError::Certificate` if either PEM cannot be parsed or the
/// key does not match the certificate.
pub fn parse_key_pair(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertifiedKey> {
    let mut certs = X509::stack_from_pem(cert_pem)
        .map_err(|e| ProxyError::Certificate(format!("failed to parse certificate: {}", e)))?
        .into_iter();
    let leaf = certs
        .next()
        .ok_or_else(|| ProxyError::Certificate("no certificate found in PEM data".to_string()))?;

    let key = PKey::private_key_from_pem(key_pem)
        .map_err(|e| ProxyError::Certificate(format!("failed to parse private key: {}", e)))?;

    let matches = leaf
        .public_key()
        .map(|public| public.public_eq(&key))
        .unwrap_or(false);
    if !matches {
        return Err(ProxyError::Certificate(
            "private key does not match certificate".to_string(),
        ));
    }

    Ok(CertifiedKey {
        leaf,
        chain: certs.collect(),
        key,
    })
}

/// Label of the first PEM block, e.g. `CERTIFICATE`
fn first_pem_label(pem: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(pem).ok()?;
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("-----BEGIN "))
        .and_then(|rest| rest.strip_suffix("-----"))
}

/// Decode a CA certificate
///
/// Only the first PEM block is used and it must be a `CERTIFICATE` block.
pub fn parse_ca_cert(ca_pem: &[u8]) -> Result<X509> {
    match first_pem_label(ca_pem) {
        Some("CERTIFICATE") => {}
        Some(label) => {
            return Err(ProxyError::Certificate(format!(
                "unable to decode PEM block: expected CERTIFICATE, found {}",
                label
            )))
        }
        None => {
            return Err(ProxyError::Certificate(
                "unable to decode PEM block: no PEM data found".to_string(),
            ))
        }
    }

    X509::from_pem(ca_pem)
        .map_err(|e| ProxyError::Certificate(format!("failed to parse CA certificate: {}", e)))
}

/// Get certificate subject as `CN=..., O=...`
pub fn get_cert_subject(cert: &X509Ref) -> Result<String> {
    let mut subject = String::new();
    for entry in cert.subject_name().entries() {
        if !subject.is_empty() {
            subject.push_str(", ");
        }
        subject.push_str(&format!(
            "{}={}",
            entry.object().nid().short_name()?,
            String::from_utf8_lossy(entry.data().as_slice())
        ));
    }

    Ok(subject)
}

/// Get the SHA-256 fingerprint as colon separated hex
pub fn get_cert_fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = cert.digest(MessageDigest::sha256())?;

    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(":"))
}

/// Subject and fingerprint in one line, for logs
pub fn describe_cert(cert: &X509Ref) -> String {
    let subject = get_cert_subject(cert).unwrap_or_else(|_| "<unreadable subject>".to_string());
    match get_cert_fingerprint(cert) {
        Ok(fingerprint) => format!("{} (SHA-256 {})", subject, fingerprint),
        Err(_) => subject,
    }
}
