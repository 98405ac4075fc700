use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::stream::BoxedSocket;
use std::time::Duration;
use tokio::net::TcpStream;

/// Manages the plaintext connection process: DNS -> TCP.
/// Roughly equivalent to net::TransportConnectJob.
pub struct ConnectJob;

impl ConnectJob {
    /// Resolve `host` and connect to the first address that accepts.
    ///
    /// With a `timeout`, the whole resolve-and-connect sequence must finish
    /// in time or `NetError::ConnectionTimedOut` is returned.
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<TcpStream, NetError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, Self::dial(host, port))
                .await
                .map_err(|_| {
                    tracing::debug!(host = %host, port, "TCP connect timed out");
                    NetError::ConnectionTimedOut
                })?,
            None => Self::dial(host, port).await,
        }
    }

    /// Same as [`ConnectJob::connect_tcp`], boxed for the pools.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<BoxedSocket, NetError> {
        Self::connect_tcp(host, port, timeout).await.map(BoxedSocket::new)
    }

    async fn dial(host: &str, port: u16) -> Result<TcpStream, NetError> {
        // 1. DNS Resolution
        let addrs = tokio::net::lookup_host((host, port)).await.dns_context(host)?;

        // 2. TCP Connect, first address that answers wins
        let mut last_error = NetError::NameNotResolved;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(host, port) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::trace!(host = %host, %addr, "TCP connected");
                    return Ok(stream);
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}
