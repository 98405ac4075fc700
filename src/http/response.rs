//! HTTP Response with body access.

use crate::base::neterror::NetError;
use crate::config::Decoders;
use crate::http::connection::Http1Connection;
use crate::http::decoder::decode_body;
use crate::http::ResponseBody;
use crate::session::registry::SessionLease;
use crate::socket::pool::Pooled;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::fmt;
use url::Url;

/// The transport a response is read from. Held until the response is
/// dropped, then given back.
pub enum ConnectionLease {
    Http1(Pooled<Http1Connection>),
    Http2(SessionLease),
    /// Not tied to a lease (server push, in-memory responses).
    Detached,
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionLease::Http1(conn) => f.debug_tuple("Http1").field(conn).finish(),
            ConnectionLease::Http2(lease) => f.debug_tuple("Http2").field(lease).finish(),
            ConnectionLease::Detached => f.write_str("Detached"),
        }
    }
}

/// HTTP Response with accessible body.
/// This is the user-facing response type that owns the body.
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    decoders: Decoders,
    body: Option<ResponseBody>,
    // Dropped after the body
    _lease: ConnectionLease,
}

impl HttpResponse {
    pub fn new(
        response: http::Response<ResponseBody>,
        url: Url,
        decoders: Decoders,
        lease: ConnectionLease,
    ) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            url,
            decoders,
            body: Some(body),
            _lease: lease,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL that was requested.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Take the raw, still encoded response body.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Read the body and undo its `content-encoding`.
    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        let raw = self.body.take().ok_or(NetError::HttpBodyError)?.bytes().await?;
        decode_body(&self.headers, &self.decoders, raw)
    }

    /// Convenience method to consume body as text.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Convenience method to consume body as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish()
    }
}
