//! Connection handler module
//!
//! This module handles individual client connections: optional TLS
//! termination, the upstream dial, and handing both streams to the
//! forwarder.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use super::forwarder::{proxy_data, RelayStats};
use super::stream::RelayStream;
use crate::common::net::split_host_port;
use crate::common::{ProxyError, Result};
use crate::config::ProxySettings;
use crate::tls::{describe_cert, TlsContext};

/// Where and how to dial for every accepted connection
#[derive(Debug)]
pub struct Upstream {
    address: String,
    host: String,
    connect_timeout: Duration,
    tls: Option<TlsContext>,
}

impl Upstream {
    /// Create the upstream description
    ///
    /// # Parameters
    ///
    /// * `settings` - Proxy settings holding the server literal and dial timeout
    /// * `tls` - Outbound TLS context, `None` for plain TCP
    ///
    /// # Errors
    ///
    /// Returns an error if the server literal has no usable host or port.
    pub fn new(settings: &ProxySettings, tls: Option<TlsContext>) -> Result<Self> {
        let (host, _) = split_host_port(&settings.server)?;

        Ok(Self {
            address: settings.server.clone(),
            host,
            connect_timeout: settings.connect_timeout(),
            tls,
        })
    }

    /// Upstream address literal
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the upstream is dialed with TLS
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Dial the upstream, bounded by the configured timeout
    ///
    /// The timeout covers the TCP connect and, when enabled, the TLS
    /// handshake. No retry is attempted.
    pub async fn connect(&self) -> Result<RelayStream> {
        timeout(self.connect_timeout, self.dial())
            .await
            .map_err(|_| {
                ProxyError::Network(format!(
                    "connection to {} timed out after {} seconds",
                    self.address,
                    self.connect_timeout.as_secs()
                ))
            })?
    }

    async fn dial(&self) -> Result<RelayStream> {
        let tcp = TcpStream::connect(self.address.as_str())
            .await
            .map_err(|e| ProxyError::Network(format!("failed to connect to {}: {}", self.address, e)))?;

        let Some(tls) = &self.tls else {
            return Ok(RelayStream::Plain(tcp));
        };

        let ssl = tls.client_session(&self.host)?;
        let mut stream = Box::pin(SslStream::new(ssl, tcp)?);
        stream.as_mut().connect().await.map_err(|e| {
            ProxyError::TlsHandshake(format!("upstream {}: {}", self.address, e))
        })?;

        debug!("TLS handshake with upstream {} successful", self.address);
        Ok(RelayStream::Tls(stream))
    }
}

/// Terminate TLS on an accepted connection
async fn accept_tls(tls: &TlsContext, client_stream: TcpStream, client_addr: SocketAddr) -> Result<RelayStream> {
    let ssl = tls.server_session()?;
    let mut stream: Pin<Box<SslStream<TcpStream>>> = Box::pin(SslStream::new(ssl, client_stream)?);

    stream
        .as_mut()
        .accept()
        .await
        .map_err(|e| ProxyError::TlsHandshake(format!("client {}: {}", client_addr, e)))?;

    debug!("TLS handshake with {} successful", client_addr);

    // Get client certificate information (if available)
    if let Some(cert) = stream.ssl().peer_certificate() {
        info!("Client {} certificate: {}", client_addr, describe_cert(&cert));
    }

    Ok(RelayStream::Tls(stream))
}

/// Handle a single client connection
///
/// The client handshake (if any) happens first, so a rejected client never
/// causes an upstream connection. If the dial fails the client connection is
/// dropped, which closes it.
///
/// # Parameters
///
/// * `client_stream` - Accepted TCP stream
/// * `client_addr` - Peer address, for logs
/// * `inbound_tls` - Listening side TLS context, `None` for plain TCP
/// * `upstream` - Upstream to dial
///
/// # Returns
///
/// Returns the relay byte counts once both connections are closed.
pub async fn handle_connection(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    inbound_tls: Option<Arc<TlsContext>>,
    upstream: Arc<Upstream>,
) -> Result<RelayStats> {
    let client = match inbound_tls.as_deref() {
        Some(tls) => accept_tls(tls, client_stream, client_addr).await?,
        None => RelayStream::Plain(client_stream),
    };

    let upstream_stream = upstream.connect().await?;
    debug!(
        "Connected {} to upstream {} ({})",
        client_addr,
        upstream.address(),
        if upstream_stream.is_tls() { "TLS" } else { "TCP" }
    );

    proxy_data(client, upstream_stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn settings(server: &str) -> ProxySettings {
        ProxySettings {
            local: ":9000".to_string(),
            server: server.to_string(),
            connect_wait_time: 2,
        }
    }

    #[test]
    fn test_upstream_new() {
        let upstream = Upstream::new(&settings("127.0.0.1:8000"), None).unwrap();
        assert_eq!(upstream.address(), "127.0.0.1:8000");
        assert!(!upstream.is_tls());

        assert!(Upstream::new(&settings("no-port"), None).is_err());
    }

    #[tokio::test]
    async fn test_dial_failure_closes_client() {
        // Reserve a port and free it so nothing is listening there
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap();
        drop(unused);

        let upstream = Arc::new(Upstream::new(&settings(&dead_addr.to_string()), None).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(relay_addr).await.unwrap();
        let (accepted, peer) = listener.accept().await.unwrap();

        let result = handle_connection(accepted, peer, None, upstream).await;
        assert!(matches!(result, Err(ProxyError::Network(_))));

        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0, "client should see the connection closed");
    }
}
