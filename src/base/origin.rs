//! Origin: the scope for connection pooling and HTTP/2 session sharing.

use crate::base::neterror::NetError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Serialized `scheme://host[:port]` of a URL, default ports omitted.
///
/// Cloning is cheap; origins are used as map keys throughout the pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin(Arc<str>);

impl Origin {
    /// Origin of a URL. Opaque origins (no host) are rejected.
    pub fn from_url(url: &Url) -> Result<Self, NetError> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(NetError::InvalidUrl);
        }
        Ok(Self(origin.ascii_serialization().into()))
    }

    /// Parse any URL string and keep only its origin.
    pub fn parse(input: &str) -> Result<Self, NetError> {
        let url = Url::parse(input).map_err(|_| NetError::InvalidUrl)?;
        Self::from_url(&url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this origin uses TLS.
    pub fn is_secure(&self) -> bool {
        self.0.starts_with("https:")
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Origin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Origin {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
