//! Response body streaming.
//! Mirrors Chromium's HttpStream::ReadResponseBody.

use crate::base::neterror::NetError;
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::fmt;

/// Response body of either protocol.
pub enum ResponseBody {
    /// HTTP/1 body from hyper.
    Incoming(Incoming),
    /// HTTP/2 stream data.
    Http2(http2::RecvStream),
    /// Already in memory.
    Full(Bytes),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }

    /// Read entire body as bytes.
    pub async fn bytes(self) -> Result<Bytes, NetError> {
        match self {
            ResponseBody::Incoming(body) => {
                let collected = body.collect().await.map_err(|_| NetError::HttpBodyError)?;
                Ok(collected.to_bytes())
            }
            ResponseBody::Http2(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.data().await {
                    let chunk = chunk.map_err(|e| {
                        tracing::debug!(error = %e, "HTTP/2 body error");
                        NetError::HttpBodyError
                    })?;
                    // Hand the window back so the server keeps sending
                    let _ = stream.flow_control().release_capacity(chunk.len());
                    buf.extend_from_slice(&chunk);
                }
                Ok(buf.freeze())
            }
            ResponseBody::Full(bytes) => Ok(bytes),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Full(bytes)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Incoming(_) => f.write_str("ResponseBody::Incoming"),
            ResponseBody::Http2(_) => f.write_str("ResponseBody::Http2"),
            ResponseBody::Full(b) => write!(f, "ResponseBody::Full({} bytes)", b.len()),
        }
    }
}
