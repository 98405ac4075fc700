//! Per-request transport selection.
//!
//! Equivalent to net::HttpStreamFactory: decides for every request whether
//! it reuses, waits for or creates a transport, negotiating HTTP/1 vs
//! HTTP/2 through ALPN for `https:` origins.

use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::config::{ContextConfig, HttpProtocol};
use crate::http::connection::Http1Connection;
use crate::http::fetch::{FetchContext, Fetcher};
use crate::http::response::HttpResponse;
use crate::http::RequestBody;
use crate::session::handle::SessionHandle;
use crate::session::options::SessionOptions;
use crate::session::registry::{SessionLease, SessionRegistry};
use crate::socket::connectjob::ConnectJob;
use crate::socket::pool::{Checkout, Pooled, SocketPool};
use crate::socket::tls::SecureConnector;
use http::Request;
use std::sync::Arc;
use url::Url;

/// How a request reaches its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProtocol {
    /// Plaintext HTTP/1.1.
    Http1,
    /// Plaintext HTTP/2 (prior knowledge).
    Http2,
    /// TLS, protocol picked by ALPN.
    Https,
}

/// A classified request target.
#[derive(Debug, Clone)]
pub struct Target {
    pub hostname: String,
    pub origin: Origin,
    pub port: u16,
    pub protocol: TargetProtocol,
    /// The URL to request, `http1:`/`http2:` rewritten to `http:`.
    pub url: Url,
}

impl Target {
    /// Classify `input`. `http1://` and `http2://` force the protocol; plain
    /// `http://` uses `default_http` for its origin.
    pub fn classify(
        input: &str,
        default_http: impl FnOnce(&Origin) -> HttpProtocol,
    ) -> Result<Self, NetError> {
        let (forced, rewritten) = match input.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http1") => {
                (Some(TargetProtocol::Http1), format!("http://{}", rest))
            }
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http2") => {
                (Some(TargetProtocol::Http2), format!("http://{}", rest))
            }
            _ => (None, input.to_string()),
        };

        let url = Url::parse(&rewritten).map_err(|_| NetError::InvalidUrl)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(NetError::UnknownUrlScheme);
        }
        let origin = Origin::from_url(&url)?;

        let protocol = match forced {
            Some(protocol) => protocol,
            None if url.scheme() == "https" => TargetProtocol::Https,
            None => match default_http(&origin) {
                HttpProtocol::Http1 => TargetProtocol::Http1,
                HttpProtocol::Http2 => TargetProtocol::Http2,
            },
        };

        let hostname = url.host_str().ok_or(NetError::InvalidUrl)?.to_string();
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        Ok(Self { hostname, origin, port, protocol, url })
    }
}

/// Hands out the session of an origin to an HTTP/2 fetch.
///
/// A session this getter did not start may fail to establish because its
/// creator's connect failed. Such a failure is retried once on a fresh
/// session; the second outcome is final.
#[derive(Clone)]
pub struct Http2SessionGetter {
    sessions: SessionRegistry,
    origin: Origin,
    extra: Option<SessionOptions>,
}

impl std::fmt::Debug for Http2SessionGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2SessionGetter").field("origin", &self.origin).finish()
    }
}

impl Http2SessionGetter {
    pub fn new(sessions: SessionRegistry, origin: Origin, extra: Option<SessionOptions>) -> Self {
        Self { sessions, origin, extra }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Acquire an established session. The lease keeps the caller's
    /// reference until dropped.
    pub async fn get(&self) -> Result<(SessionLease, SessionHandle), NetError> {
        let lease = self.sessions.acquire_session(&self.origin, self.extra.as_ref());
        match lease.session().await {
            Ok(handle) => Ok((lease, handle)),
            Err(e) if lease.created_here() => Err(e),
            Err(e) => {
                tracing::debug!(origin = %self.origin, error = %e, "joined session failed, retrying once");
                lease.release();
                drop(lease);

                let lease = self.sessions.acquire_session(&self.origin, self.extra.as_ref());
                let handle = lease.session().await?;
                Ok((lease, handle))
            }
        }
    }

    /// A request saw GOAWAY on `handle`: stop handing it out.
    pub fn retire(&self, handle: &SessionHandle) {
        self.sessions.retire(handle);
    }
}

/// Selects and acquires transports, then delegates the exchange to a
/// [`Fetcher`].
pub struct HttpStreamFactory {
    config: Arc<ContextConfig>,
    pool: SocketPool<Http1Connection>,
    sessions: SessionRegistry,
    secure: Arc<dyn SecureConnector>,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for HttpStreamFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamFactory")
            .field("pool", &self.pool)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl HttpStreamFactory {
    pub fn new(
        config: Arc<ContextConfig>,
        pool: SocketPool<Http1Connection>,
        sessions: SessionRegistry,
        secure: Arc<dyn SecureConnector>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self { config, pool, sessions, secure, fetcher }
    }

    pub fn classify(&self, input: &str) -> Result<Target, NetError> {
        Target::classify(input, |origin| self.config.http_protocol.get(origin))
    }

    fn context(&self, target: &Target) -> FetchContext {
        FetchContext {
            url: target.url.clone(),
            accept: self.config.accept.get(&target.origin),
            user_agent: self.config.user_agent(&target.origin),
            decoders: self.config.decoders.get(&target.origin),
        }
    }

    /// Issue `request` over whichever transport its target calls for.
    pub async fn fetch(&self, mut request: Request<RequestBody>) -> Result<HttpResponse, NetError> {
        let target = self.classify(&request.uri().to_string())?;
        *request.uri_mut() = target.url.as_str().parse().map_err(|_| NetError::InvalidUrl)?;
        let ctx = self.context(&target);

        tracing::trace!(url = %target.url, protocol = ?target.protocol, "fetch");
        match target.protocol {
            TargetProtocol::Http1 => {
                let conn = self.http1_connection(&target).await?;
                self.fetcher.fetch_http1(conn, request, ctx).await
            }
            TargetProtocol::Http2 => {
                self.fetcher.fetch_http2(self.session_getter(&target, None), request, ctx).await
            }
            TargetProtocol::Https => self.fetch_https(&target, request, ctx).await,
        }
    }

    fn session_getter(&self, target: &Target, extra: Option<SessionOptions>) -> Http2SessionGetter {
        Http2SessionGetter::new(self.sessions.clone(), target.origin.clone(), extra)
    }

    /// Free connection, else a reserved slot, else wait in line.
    async fn checkout(&self, origin: &Origin) -> Result<Checkout<Http1Connection>, NetError> {
        match self.pool.get_free_socket(origin) {
            Checkout::Full => self.pool.wait_for_socket(origin).await,
            checkout => Ok(checkout),
        }
    }

    async fn http1_connection(&self, target: &Target) -> Result<Pooled<Http1Connection>, NetError> {
        match self.checkout(&target.origin).await? {
            Checkout::Reuse(conn) => Ok(conn),
            Checkout::Create(reservation) => {
                let socket = ConnectJob::connect(
                    &target.hostname,
                    target.port,
                    self.config.http1.connect_timeout,
                )
                .await?;
                let conn = Http1Connection::handshake(socket).await?;
                tracing::debug!(origin = %target.origin, "new HTTP/1 connection");
                Ok(reservation.fulfill(conn))
            }
            // wait_for_socket never yields Full
            Checkout::Full => Err(NetError::Failed),
        }
    }

    async fn fetch_https(
        &self,
        target: &Target,
        request: Request<RequestBody>,
        ctx: FetchContext,
    ) -> Result<HttpResponse, NetError> {
        let origin = &target.origin;
        if self.sessions.has_origin(origin) {
            return self.fetcher.fetch_http2(self.session_getter(target, None), request, ctx).await;
        }

        // The origin may already have settled on HTTP/1
        let reservation = match self.checkout(origin).await? {
            Checkout::Reuse(conn) => return self.fetcher.fetch_http1(conn, request, ctx).await,
            Checkout::Create(reservation) => Some(reservation),
            Checkout::Full => None,
        };

        // A session may have come up while this request waited for a slot
        if self.sessions.has_origin(origin) {
            drop(reservation);
            return self.fetcher.fetch_http2(self.session_getter(target, None), request, ctx).await;
        }

        let protocols = self.config.https_protocols.get(origin);
        let mut tls = self.config.tls.clone();
        if let Some(reject) = self.config.session.get(origin).reject_unauthorized {
            tls.reject_unauthorized = reject;
        }
        let negotiated = self.secure.connect(&target.hostname, target.port, &protocols, &tls).await?;
        tracing::debug!(origin = %origin, protocol = %negotiated.protocol, "ALPN negotiated");

        match negotiated.protocol {
            HttpProtocol::Http2 => {
                drop(reservation);
                let extra = SessionOptions::with_transport(negotiated.socket);
                self.fetcher.fetch_http2(self.session_getter(target, Some(extra)), request, ctx).await
            }
            HttpProtocol::Http1 => {
                let conn = Http1Connection::handshake(negotiated.socket).await?;
                let conn = match reservation {
                    Some(reservation) => reservation.fulfill(conn),
                    None => self.pool.add_used_socket(origin, conn),
                };
                self.fetcher.fetch_http1(conn, request, ctx).await
            }
        }
    }

    pub fn pool(&self) -> &SocketPool<Http1Connection> {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}
