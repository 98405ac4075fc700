//! Request/response exchange over an acquired transport.

use crate::base::neterror::NetError;
use crate::config::Decoders;
use crate::http::connection::Http1Connection;
use crate::http::response::{ConnectionLease, HttpResponse};
use crate::http::streamfactory::Http2SessionGetter;
use crate::http::RequestBody;
use crate::socket::pool::Pooled;
use futures::future::BoxFuture;
use http::header::{self, HeaderValue};
use http::{Request, Version};
use url::Url;

/// Per-request values resolved from the client configuration.
#[derive(Clone)]
pub struct FetchContext {
    pub url: Url,
    pub accept: String,
    pub user_agent: String,
    pub decoders: Decoders,
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("url", &self.url.as_str())
            .field("accept", &self.accept)
            .field("user_agent", &self.user_agent)
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

/// Exchanges one request over a transport the stream factory acquired.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch_http1(
        &self,
        conn: Pooled<Http1Connection>,
        request: Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>>;

    fn fetch_http2(
        &self,
        session: Http2SessionGetter,
        request: Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>>;
}

/// Default [`Fetcher`]: hyper for HTTP/1, the session transport for HTTP/2.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperFetcher;

/// Headers HTTP/2 forbids (RFC 9113 section 8.2.2).
const CONNECTION_SPECIFIC: [&str; 5] =
    ["connection", "keep-alive", "proxy-connection", "transfer-encoding", "upgrade"];

fn apply_defaults(request: &mut Request<RequestBody>, ctx: &FetchContext) {
    let headers = request.headers_mut();
    if !headers.contains_key(header::USER_AGENT) && !ctx.user_agent.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&ctx.user_agent) {
            headers.insert(header::USER_AGENT, value);
        }
    }
    if !headers.contains_key(header::ACCEPT) {
        if let Ok(value) = HeaderValue::from_str(&ctx.accept) {
            headers.insert(header::ACCEPT, value);
        }
    }
}

/// Host header value: host plus any non-default port.
fn host_header(url: &Url) -> Option<HeaderValue> {
    let host = url.host_str()?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}

/// HTTP/1 request: origin-form target and a Host header.
fn prepare_http1(mut request: Request<RequestBody>, ctx: &FetchContext) -> Result<Request<RequestBody>, NetError> {
    apply_defaults(&mut request, ctx);
    if !request.headers().contains_key(header::HOST) {
        if let Some(host) = host_header(&ctx.url) {
            request.headers_mut().insert(header::HOST, host);
        }
    }

    let target = match ctx.url.query() {
        Some(query) => format!("{}?{}", ctx.url.path(), query),
        None => ctx.url.path().to_string(),
    };
    *request.uri_mut() = target.parse().map_err(|_| NetError::InvalidUrl)?;
    *request.version_mut() = Version::HTTP_11;
    Ok(request)
}

/// HTTP/2 request: absolute URI, no connection-specific headers.
fn prepare_http2(mut request: Request<RequestBody>, ctx: &FetchContext) -> Result<Request<RequestBody>, NetError> {
    apply_defaults(&mut request, ctx);
    let headers = request.headers_mut();
    headers.remove(header::HOST);
    for name in CONNECTION_SPECIFIC {
        headers.remove(name);
    }
    let len = request.body().len();
    if len > 0 && !request.headers().contains_key(header::CONTENT_LENGTH) {
        request.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    *request.uri_mut() = ctx.url.as_str().parse().map_err(|_| NetError::InvalidUrl)?;
    *request.version_mut() = Version::HTTP_2;
    Ok(request)
}

fn clone_request(request: &Request<RequestBody>) -> Request<RequestBody> {
    let mut clone = Request::new(request.body().clone());
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    clone
}

impl Fetcher for HyperFetcher {
    fn fetch_http1(
        &self,
        mut conn: Pooled<Http1Connection>,
        request: Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>> {
        Box::pin(async move {
            let request = prepare_http1(request, &ctx)?;
            let response = match conn.send_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    conn.discard();
                    return Err(e);
                }
            };
            Ok(HttpResponse::new(response, ctx.url, ctx.decoders, ConnectionLease::Http1(conn)))
        })
    }

    fn fetch_http2(
        &self,
        session: Http2SessionGetter,
        request: Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>> {
        Box::pin(async move {
            let request = prepare_http2(request, &ctx)?;
            let (lease, handle) = session.get().await?;

            let response = match handle.send_request(clone_request(&request)).await {
                Ok(response) => (response, lease),
                Err(NetError::Http2ServerRefusedStream) => {
                    // The session went away under us; one fresh session gets the request
                    tracing::debug!(origin = %session.origin(), session = handle.id(), "stream refused, retrying on a new session");
                    session.retire(&handle);
                    drop(lease);
                    let (lease, handle) = session.get().await?;
                    (handle.send_request(request).await?, lease)
                }
                Err(e) => return Err(e),
            };

            let (response, lease) = response;
            Ok(HttpResponse::new(response, ctx.url, ctx.decoders, ConnectionLease::Http2(lease)))
        })
    }
}
