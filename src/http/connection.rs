//! HTTP/1.1 client connection.
//! Equivalent to net::HttpBasicStream over a pooled socket.

use crate::base::neterror::NetError;
use crate::http::{RequestBody, ResponseBody};
use crate::socket::pool::Poolable;
use crate::socket::stream::BoxedSocket;
use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;

/// A handshaken HTTP/1.1 connection. The connection driver runs on its own
/// task until the peer closes or the sender is dropped.
pub struct Http1Connection {
    sender: http1::SendRequest<Full<Bytes>>,
}

impl Http1Connection {
    pub async fn handshake(socket: BoxedSocket) -> Result<Self, NetError> {
        let io = TokioIo::new(socket);
        let (sender, conn) = http1::handshake(io).await.map_err(|e| {
            tracing::debug!(error = %e, "HTTP/1 handshake failed");
            NetError::ConnectionFailed
        })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "HTTP/1 connection closed with error");
            }
        });

        Ok(Self { sender })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send one request and wait for the response head.
    pub async fn send_request(
        &mut self,
        request: http::Request<RequestBody>,
    ) -> Result<http::Response<ResponseBody>, NetError> {
        self.sender.ready().await.map_err(|_| NetError::ConnectionClosed)?;

        let request = request.map(RequestBody::into_full);
        let response = self.sender.send_request(request).await.map_err(|e| {
            tracing::debug!(error = %e, "HTTP/1 request failed");
            if e.is_incomplete_message() || e.is_closed() {
                NetError::ConnectionClosed
            } else if e.is_parse() {
                NetError::InvalidResponse
            } else {
                NetError::ConnectionReset
            }
        })?;

        Ok(response.map(ResponseBody::Incoming))
    }
}

impl Poolable for Http1Connection {
    fn is_reusable(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl std::fmt::Debug for Http1Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1Connection").field("closed", &self.is_closed()).finish()
    }
}
