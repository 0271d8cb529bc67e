//! Proxy server module
//!
//! This module binds the listening socket and runs the accept loop. Every
//! accepted connection is handled in its own task; the loop never waits on
//! a connection.

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use super::handler::{handle_connection, Upstream};
use crate::common::net::{parse_local_addr, LocalAddr};
use crate::common::{ProxyError, Result};
use crate::config::RelayConfig;
use crate::tls::{build_inbound_context, build_outbound_context, TlsContext};

/// Pending connection backlog for the dual-stack listener
const LISTEN_BACKLOG: i32 = 1024;

/// Bind `[::]:port` with `IPV6_V6ONLY` off, so IPv4 clients are accepted too
fn bind_dual_stack(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Bind the listening socket for `local`
///
/// The wildcard form listens on IPv6 and IPv4 through one dual-stack
/// socket, and falls back to `0.0.0.0` when the host has no IPv6.
async fn bind_listener(local: &LocalAddr) -> io::Result<TcpListener> {
    let Some((v6, v4)) = local.wildcard_addrs() else {
        return TcpListener::bind((local.bind_host().as_str(), local.port)).await;
    };

    match bind_dual_stack(v6) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(e),
        Err(e) => {
            warn!("IPv6 unavailable ({}), listening on IPv4 only", e);
            TcpListener::bind(v4).await
        }
    }
}

/// Proxy server structure
///
/// Holds the bound listener and the immutable state shared by all
/// connections: the inbound TLS context and the upstream description.
pub struct Proxy {
    /// Bound listener
    listener: TcpListener,
    /// Actual bound address
    local_addr: SocketAddr,
    /// TLS context for accepted connections, `None` for plain TCP
    inbound_tls: Option<Arc<TlsContext>>,
    /// Upstream to dial for each connection
    upstream: Arc<Upstream>,
}

impl Proxy {
    /// Build TLS contexts, resolve the local address and bind
    ///
    /// Every startup failure surfaces here, before any connection is
    /// accepted.
    ///
    /// # Parameters
    ///
    /// * `config` - Loaded relay configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a TLS context cannot be built, the local address
    /// is invalid, or the bind fails.
    pub async fn from_config(config: &RelayConfig) -> Result<Self> {
        let inbound_tls = if config.local_ssl.is_enabled() {
            Some(build_inbound_context(&config.local_ssl)?)
        } else {
            None
        };

        let outbound_tls = if config.server_ssl.is_enabled() {
            Some(build_outbound_context(&config.server_ssl)?)
        } else {
            None
        };

        let local = parse_local_addr(&config.proxy.local)?;
        let upstream = Upstream::new(&config.proxy, outbound_tls)?;

        Self::bind(&local, inbound_tls, upstream).await
    }

    /// Bind the listener on `local`
    ///
    /// # Parameters
    ///
    /// * `local` - Bind address
    /// * `inbound_tls` - TLS context for accepted connections, `None` for plain TCP
    /// * `upstream` - Upstream to dial for each connection
    pub async fn bind(local: &LocalAddr, inbound_tls: Option<TlsContext>, upstream: Upstream) -> Result<Self> {
        let listener = bind_listener(local)
            .await
            .map_err(|e| ProxyError::Network(format!("failed to bind {}: {}", local, e)))?;
        let local_addr = listener.local_addr()?;

        info!(
            "Listening on {} ({}), forwarding to {} ({})",
            local_addr,
            if inbound_tls.is_some() { "TLS" } else { "TCP" },
            upstream.address(),
            if upstream.is_tls() { "TLS" } else { "TCP" },
        );

        Ok(Self {
            listener,
            local_addr,
            inbound_tls: inbound_tls.map(Arc::new),
            upstream: Arc::new(upstream),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop
    ///
    /// Runs until the future is dropped. Accept errors are logged and the
    /// loop keeps going. Dropping the future aborts all live connections.
    pub async fn run(self) -> Result<()> {
        // Create a JoinSet to manage tasks efficiently
        let mut tasks = JoinSet::new();

        loop {
            // Check for completed tasks and log any panics
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Connection task error: {}", e);
                }
            }

            match self.listener.accept().await {
                Ok((client_stream, client_addr)) => {
                    info!("Accepted connection from {}", client_addr);

                    let inbound_tls = self.inbound_tls.clone();
                    let upstream = Arc::clone(&self.upstream);

                    tasks.spawn(async move {
                        match handle_connection(client_stream, client_addr, inbound_tls, upstream).await {
                            Ok(stats) => debug!(
                                "Connection from {} closed ({} bytes up, {} bytes down)",
                                client_addr, stats.client_to_upstream, stats.upstream_to_client
                            ),
                            Err(e) => warn!("Connection from {} ended with error: {}", client_addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
