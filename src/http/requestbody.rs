//! Outgoing request payloads, shared by the HTTP/1 and HTTP/2 paths.

use bytes::Bytes;
use http_body_util::Full;

/// Request payload. Cheap to clone, so a request can be replayed on a
/// fresh HTTP/2 session.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl RequestBody {
    /// No payload bytes at all, whichever variant.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(b) => b.len(),
        }
    }

    /// The payload for a DATA frame, `None` when the HEADERS frame ends the
    /// stream.
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            RequestBody::Bytes(b) if !b.is_empty() => Some(b),
            _ => None,
        }
    }

    /// hyper body for the HTTP/1 connection.
    pub fn into_full(self) -> Full<Bytes> {
        Full::new(self.into_data().unwrap_or_default())
    }
}
