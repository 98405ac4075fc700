//! Client context configuration.
//!
//! Based on Chromium's net::URLRequestContext configuration: one place that
//! bundles everything the stream factory and the pools need to know. Every
//! setting that can differ between origins is a [`PerOrigin`] value.

use crate::base::origin::Origin;
use crate::http::decoder::ContentDecoder;
use crate::session::options::SessionOptions;
use crate::socket::tls::TlsConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Wire protocol of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpProtocol {
    Http1,
    Http2,
}

impl HttpProtocol {
    /// ALPN protocol id (RFC 7301).
    pub fn alpn_id(self) -> &'static str {
        match self {
            HttpProtocol::Http1 => "http/1.1",
            HttpProtocol::Http2 => "h2",
        }
    }
}

impl fmt::Display for HttpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alpn_id())
    }
}

/// A setting that is either constant or computed from the origin.
pub enum PerOrigin<T> {
    Value(T),
    Resolver(Arc<dyn Fn(&Origin) -> T + Send + Sync>),
}

impl<T: Clone> PerOrigin<T> {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&Origin) -> T + Send + Sync + 'static,
    {
        PerOrigin::Resolver(Arc::new(f))
    }

    /// Value for `origin`.
    pub fn get(&self, origin: &Origin) -> T {
        match self {
            PerOrigin::Value(value) => value.clone(),
            PerOrigin::Resolver(resolve) => resolve(origin),
        }
    }
}

impl<T: Clone> Clone for PerOrigin<T> {
    fn clone(&self) -> Self {
        match self {
            PerOrigin::Value(value) => PerOrigin::Value(value.clone()),
            PerOrigin::Resolver(resolve) => PerOrigin::Resolver(Arc::clone(resolve)),
        }
    }
}

impl<T: Default> Default for PerOrigin<T> {
    fn default() -> Self {
        PerOrigin::Value(T::default())
    }
}

impl<T> From<T> for PerOrigin<T> {
    fn from(value: T) -> Self {
        PerOrigin::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for PerOrigin<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerOrigin::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PerOrigin::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Decoders tried in order against `content-encoding`.
pub type Decoders = Vec<Arc<dyn ContentDecoder>>;

/// HTTP/1 socket pool settings.
#[derive(Debug, Clone)]
pub struct Http1Options {
    /// Maximum connections per origin (Chromium: 6).
    pub max_sockets_per_origin: usize,
    /// Idle connections older than this are closed.
    pub idle_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for Http1Options {
    fn default() -> Self {
        Self {
            max_sockets_per_origin: 6,
            idle_timeout: Duration::from_secs(300),
            connect_timeout: None,
        }
    }
}

pub const DEFAULT_ACCEPT: &str = "application/json, text/*;0.9, */*;q=0.8";

/// Configuration options for a [`Client`](crate::Client).
#[derive(Clone)]
pub struct ContextConfig {
    /// User-Agent prepended to the default one.
    pub user_agent: PerOrigin<Option<String>>,

    /// Send `user_agent` alone instead of prepending it.
    pub overwrite_user_agent: PerOrigin<bool>,

    /// Accept header value.
    pub accept: PerOrigin<String>,

    /// Content decoders for response bodies.
    pub decoders: PerOrigin<Decoders>,

    /// HTTP/2 session options.
    pub session: PerOrigin<SessionOptions>,

    /// Protocol used for plain `http:` URLs.
    pub http_protocol: PerOrigin<HttpProtocol>,

    /// ALPN preference for `https:` URLs.
    pub https_protocols: PerOrigin<Vec<HttpProtocol>>,

    /// HTTP/1 pool settings.
    pub http1: Http1Options,

    /// TLS options.
    pub tls: TlsConfig,

    /// Computed once, see [`default_user_agent`].
    pub default_user_agent: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            user_agent: PerOrigin::Value(None),
            overwrite_user_agent: PerOrigin::Value(false),
            accept: PerOrigin::Value(DEFAULT_ACCEPT.to_string()),
            decoders: PerOrigin::Value(Vec::new()),
            session: PerOrigin::default(),
            http_protocol: PerOrigin::Value(HttpProtocol::Http1),
            https_protocols: PerOrigin::Value(vec![HttpProtocol::Http2, HttpProtocol::Http1]),
            http1: Http1Options::default(),
            tls: TlsConfig::default(),
            default_user_agent: default_user_agent(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
            ),
        }
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("user_agent", &self.user_agent)
            .field("overwrite_user_agent", &self.overwrite_user_agent)
            .field("accept", &self.accept)
            .field("http_protocol", &self.http_protocol)
            .field("https_protocols", &self.https_protocols)
            .field("http1", &self.http1)
            .field("tls", &self.tls)
            .field("default_user_agent", &self.default_user_agent)
            .finish()
    }
}

impl ContextConfig {
    /// User-Agent header value for requests to `origin`.
    pub fn user_agent(&self, origin: &Origin) -> String {
        let ua = self.user_agent.get(origin).filter(|ua| !ua.is_empty());
        let overwrite = self.overwrite_user_agent.get(origin);
        match ua {
            Some(ua) if overwrite => ua,
            Some(ua) => format!("{} {}", ua, self.default_user_agent),
            // Overwriting with nothing sends no User-Agent at all
            None if overwrite => String::new(),
            None => self.default_user_agent.clone(),
        }
    }
}

/// Default User-Agent for this library.
pub fn default_user_agent(name: &str, version: &str) -> String {
    format!(
        "{}/{} (+https://github.com/fetchnet/fetchnet) hyper/1 http2/0.5",
        name, version
    )
}
