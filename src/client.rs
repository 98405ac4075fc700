//! HTTP Client with builder pattern.
//!
//! Provides a high-level API over the stream factory: one client owns one
//! HTTP/1 socket pool and one HTTP/2 session registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use fetchnet::Client;
//!
//! let client = Client::builder()
//!     .user_agent("my-app/1.0")
//!     .build();
//!
//! let resp = client.get("https://example.com")
//!     .send()
//!     .await?;
//! ```

use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::config::{ContextConfig, HttpProtocol, PerOrigin};
use crate::http::connection::Http1Connection;
use crate::http::decoder::ContentDecoder;
use crate::http::fetch::{Fetcher, HyperFetcher};
use crate::http::streamfactory::HttpStreamFactory;
use crate::http::{HttpResponse, RequestBody};
use crate::session::connector::H2Connector;
use crate::session::options::SessionOptions;
use crate::session::push::{PushedRequest, PushedResponse};
use crate::session::registry::SessionRegistry;
use crate::session::transport::SessionConnector;
use crate::socket::pool::SocketPool;
use crate::socket::tls::{BoringConnector, SecureConnector, TlsConfig};
use http::Method;
use std::sync::Arc;
use std::time::Duration;

/// How often idle HTTP/1 connections are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP Client for making requests.
///
/// Use [`Client::builder()`] to configure and create a client. Clones share
/// the same pools.
#[derive(Clone, Debug)]
pub struct Client {
    factory: Arc<HttpStreamFactory>,
    config: Arc<ContextConfig>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        ClientBuilder::default().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.as_ref().to_string(),
            headers: http::HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Issue a prepared request.
    pub async fn fetch(&self, request: http::Request<RequestBody>) -> Result<HttpResponse, NetError> {
        self.factory.fetch(request).await
    }

    /// Receive the server pushes of every HTTP/2 session of this client.
    pub fn on_push<F>(&self, handler: F)
    where
        F: Fn(&Origin, PushedRequest, PushedResponse) + Send + Sync + 'static,
    {
        self.factory.sessions().set_push_handler(Some(Arc::new(handler)));
    }

    /// Stop receiving server pushes; later pushes are dropped.
    pub fn clear_push_handler(&self) {
        self.factory.sessions().set_push_handler(None);
    }

    /// Close the HTTP/1 connections and HTTP/2 sessions of `url`'s origin.
    pub async fn disconnect(&self, url: &str) -> Result<(), NetError> {
        let target = self.factory.classify(url)?;
        self.factory.pool().close_specific(&target.origin);
        self.factory.sessions().close_specific(&target.origin, None).await;
        Ok(())
    }

    /// Close every connection and session.
    pub async fn disconnect_all(&self) {
        self.factory.pool().close_all();
        self.factory.sessions().close_all().await;
    }

    pub fn sessions(&self) -> &SessionRegistry {
        self.factory.sessions()
    }

    pub fn socket_pool(&self) -> &SocketPool<Http1Connection> {
        self.factory.pool()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ContextConfig,
    secure: Option<Arc<dyn SecureConnector>>,
    session_connector: Option<Arc<dyn SessionConnector>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl ClientBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// User-Agent sent ahead of the library's own.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = PerOrigin::Value(Some(user_agent.into()));
        self
    }

    /// Send the configured User-Agent alone.
    pub fn overwrite_user_agent(mut self, overwrite: bool) -> Self {
        self.config.overwrite_user_agent = PerOrigin::Value(overwrite);
        self
    }

    /// Set the Accept header value.
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.config.accept = PerOrigin::Value(accept.into());
        self
    }

    /// Add a response content decoder.
    pub fn decoder(mut self, decoder: impl ContentDecoder) -> Self {
        let decoder: Arc<dyn ContentDecoder> = Arc::new(decoder);
        self.config.decoders = match self.config.decoders {
            PerOrigin::Value(mut decoders) => {
                decoders.push(decoder);
                PerOrigin::Value(decoders)
            }
            PerOrigin::Resolver(resolve) => PerOrigin::resolver(move |origin| {
                let mut decoders = resolve(origin);
                decoders.push(Arc::clone(&decoder));
                decoders
            }),
        };
        self
    }

    /// Protocol for plain `http:` URLs.
    pub fn http_protocol(mut self, protocol: impl Into<PerOrigin<HttpProtocol>>) -> Self {
        self.config.http_protocol = protocol.into();
        self
    }

    /// ALPN preference for `https:` URLs.
    pub fn https_protocols(mut self, protocols: impl Into<PerOrigin<Vec<HttpProtocol>>>) -> Self {
        self.config.https_protocols = protocols.into();
        self
    }

    /// HTTP/2 session options.
    pub fn session_options(mut self, options: impl Into<PerOrigin<SessionOptions>>) -> Self {
        self.config.session = options.into();
        self
    }

    /// Maximum HTTP/1 connections per origin.
    pub fn max_sockets_per_origin(mut self, max: usize) -> Self {
        self.config.http1.max_sockets_per_origin = max;
        self
    }

    /// Close idle HTTP/1 connections after `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.http1.idle_timeout = timeout;
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http1.connect_timeout = Some(timeout);
        self
    }

    /// Set TLS options.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    /// Use another TLS connector.
    pub fn secure_connector(mut self, secure: Arc<dyn SecureConnector>) -> Self {
        self.secure = Some(secure);
        self
    }

    /// Use another HTTP/2 session transport.
    pub fn session_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.session_connector = Some(connector);
        self
    }

    /// Use another request exchange.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let config = Arc::new(self.config);

        let secure = self.secure.unwrap_or_else(|| {
            Arc::new(BoringConnector::new(config.http1.connect_timeout)) as Arc<dyn SecureConnector>
        });
        let session_connector = self.session_connector.unwrap_or_else(|| {
            Arc::new(H2Connector::new(Arc::clone(&secure), config.tls.clone()))
                as Arc<dyn SessionConnector>
        });
        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(HyperFetcher) as Arc<dyn Fetcher>);

        let pool = SocketPool::new(config.http1.max_sockets_per_origin, config.http1.idle_timeout);
        // Idle sweeps need a runtime; without one, expired connections are
        // still skipped on checkout
        if tokio::runtime::Handle::try_current().is_ok() {
            pool.start_cleanup_task(CLEANUP_INTERVAL);
        }

        let sessions =
            SessionRegistry::new(session_connector, config.session.clone(), config.decoders.clone());
        let factory = Arc::new(HttpStreamFactory::new(
            Arc::clone(&config),
            pool,
            sessions,
            secure,
            fetcher,
        ));

        Client { factory, config }
    }
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: http::HeaderMap,
    body: RequestBody,
}

impl RequestBuilder {
    /// Add a header.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: http::header::IntoHeaderName,
        V: TryInto<http::HeaderValue>,
    {
        if let Ok(val) = value.try_into() {
            self.headers.insert(key, val);
        }
        self
    }

    /// Set request body.
    pub fn body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(json) {
            self.body = bytes.into();
            self.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse, NetError> {
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(self.url.as_str())
            .body(self.body)
            .map_err(|_| NetError::InvalidUrl)?;
        *request.headers_mut() = self.headers;

        self.client.fetch(request).await
    }
}
