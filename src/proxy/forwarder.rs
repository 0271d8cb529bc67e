//! Data forwarding module
//!
//! This module pumps bytes between the client and the upstream. Each
//! direction runs in its own task. The first direction to finish tears the
//! other one down, which closes the upstream connection and releases any
//! read still blocked on either socket.

use std::fmt;
use std::io;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

use crate::common::{ProxyError, Result};

/// Copy direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to upstream
    ClientToUpstream,
    /// Upstream to client
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientToUpstream => write!(f, "client to upstream"),
            Self::UpstreamToClient => write!(f, "upstream to client"),
        }
    }
}

/// Bytes moved in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes sent from the client to the upstream
    pub client_to_upstream: u64,
    /// Bytes sent from the upstream to the client
    pub upstream_to_client: u64,
}

/// Copy until EOF or error, then shut the writer down so the peer sees EOF
async fn pump<R, W>(direction: Direction, mut reader: R, mut writer: W) -> (Direction, io::Result<u64>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::io::copy(&mut reader, &mut writer).await;
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown after {} finished: {}", direction, e);
    }
    (direction, result)
}

/// Forward data between two streams
///
/// Returns once both directions have stopped and every half of both
/// streams has been dropped, i.e. both connections are closed.
///
/// # Parameters
///
/// * `client` - Accepted client stream
/// * `upstream` - Dialed upstream stream
///
/// # Returns
///
/// Returns the byte counts, or the first I/O error seen in either direction.
pub async fn proxy_data<C, U>(client: C, upstream: U) -> Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (upstream_reader, upstream_writer) = tokio::io::split(upstream);

    let mut tasks = JoinSet::new();
    tasks.spawn(pump(Direction::ClientToUpstream, client_reader, upstream_writer));
    tasks.spawn(pump(Direction::UpstreamToClient, upstream_reader, client_writer));

    let mut stats = RelayStats::default();
    let mut first_error = None;
    let mut torn_down = false;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((direction, Ok(bytes))) => {
                debug!("{} finished after {} bytes", direction, bytes);
                match direction {
                    Direction::ClientToUpstream => stats.client_to_upstream = bytes,
                    Direction::UpstreamToClient => stats.upstream_to_client = bytes,
                }
            }
            Ok((direction, Err(e))) => {
                warn!("Error copying data from {}: {}", direction, e);
                first_error.get_or_insert(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Copy task failed: {}", e),
        }

        // First finished direction closes the other one
        if !torn_down {
            torn_down = true;
            tasks.abort_all();
        }
    }

    debug!(
        "Connection closed: {} bytes client to upstream, {} bytes upstream to client",
        stats.client_to_upstream, stats.upstream_to_client
    );

    match first_error {
        Some(e) => Err(ProxyError::Io(e)),
        None => Ok(stats),
    }
}
