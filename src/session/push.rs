//! HTTP/2 server push dispatch.

use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::config::Decoders;
use crate::http::response::{ConnectionLease, HttpResponse};
use crate::http::ResponseBody;
use crate::session::handle::SessionHandle;
use futures::FutureExt;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// What happens on a pushed stream.
#[derive(Debug)]
pub enum PushEvent {
    /// Response headers arrived.
    Response(http::Response<ResponseBody>),
    /// The stream was aborted.
    Aborted,
    /// A frame on the stream could not be processed.
    FrameError,
    Error(NetError),
    /// The stream is closed. Always the last event.
    Close,
}

/// A stream the server pushed on a session, as delivered by the transport.
#[derive(Debug)]
pub struct PushedStream {
    /// Promised request headers, pseudo-headers included.
    pub request_headers: Vec<(String, String)>,
    pub events: mpsc::UnboundedReceiver<PushEvent>,
}

impl PushedStream {
    pub fn new(request_headers: Vec<(String, String)>) -> (Self, mpsc::UnboundedSender<PushEvent>) {
        let (tx, events) = mpsc::unbounded_channel();
        (Self { request_headers, events }, tx)
    }
}

/// The request a server push answers.
#[derive(Debug, Clone)]
pub struct PushedRequest {
    pub path: String,
    pub url: Url,
    /// Promised headers, pseudo-headers stripped.
    pub headers: HeaderMap,
}

/// Resolves with the pushed response once its headers arrive.
pub struct PushedResponse {
    rx: oneshot::Receiver<Result<HttpResponse, NetError>>,
}

impl Future for PushedResponse {
    type Output = Result<HttpResponse, NetError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|r| r.unwrap_or(Err(NetError::Http2PushedStreamNotAvailable)))
    }
}

impl fmt::Debug for PushedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushedResponse").finish()
    }
}

/// Receives every server push of every session.
pub type PushHandler = Arc<dyn Fn(&Origin, PushedRequest, PushedResponse) + Send + Sync>;

/// Holds one reference on the parent session while a push is alive.
struct PushRef(SessionHandle);

impl Drop for PushRef {
    fn drop(&mut self) {
        self.0.unref();
    }
}

/// Split the promised headers into the `:path` value and the regular headers.
fn split_pushed_headers(raw: Vec<(String, String)>) -> (Option<String>, HeaderMap) {
    let mut path = None;
    let mut headers = HeaderMap::new();
    for (name, value) in raw {
        if name == ":path" {
            path = Some(value);
            continue;
        }
        if name.starts_with(':') {
            continue;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::trace!(header = %name, "dropping malformed pushed header"),
        }
    }
    (path, headers)
}

/// Hand a pushed stream to `handler`, or drop it when there is none.
pub(crate) fn dispatch(
    handler: Option<PushHandler>,
    session: &SessionHandle,
    decoders: Decoders,
    stream: PushedStream,
) {
    let origin = session.origin();
    let Some(handler) = handler else {
        tracing::debug!(origin = %origin, session = session.id(), "no push handler, dropping pushed stream");
        return;
    };

    let PushedStream { request_headers, mut events } = stream;
    let (path, headers) = split_pushed_headers(request_headers);
    let Some(path) = path else {
        tracing::debug!(origin = %origin, "pushed stream without :path, dropping");
        return;
    };
    let url = match Url::parse(origin.as_str()).and_then(|base| base.join(&path)) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(origin = %origin, path = %path, error = %e, "bad pushed path, dropping");
            return;
        }
    };

    session.add_ref();
    let guard = PushRef(session.clone());

    let (tx, rx) = oneshot::channel();
    let request = PushedRequest { path, url: url.clone(), headers };
    handler(origin, request, PushedResponse { rx });

    let session_id = session.id();
    tokio::spawn(async move {
        let _guard = guard;
        let mut tx = Some(tx);

        while let Some(event) = events.recv().await {
            let result = match event {
                PushEvent::Response(response) => Ok(HttpResponse::new(
                    response,
                    url.clone(),
                    decoders.clone(),
                    ConnectionLease::Detached,
                )),
                PushEvent::Aborted => Err(NetError::Aborted),
                PushEvent::FrameError => Err(NetError::Http2ProtocolError),
                PushEvent::Error(e) => Err(e),
                PushEvent::Close => break,
            };
            settle(&mut tx, result, session_id, &url);
        }

        if tx.is_some() {
            settle(&mut tx, Err(NetError::Http2PushedStreamNotAvailable), session_id, &url);
        }
    });
}

/// Resolve the pushed response once; later errors and errors nobody waits
/// for only show up in the trace.
fn settle(
    tx: &mut Option<oneshot::Sender<Result<HttpResponse, NetError>>>,
    result: Result<HttpResponse, NetError>,
    session_id: u64,
    url: &Url,
) {
    match tx.take() {
        Some(tx) => {
            if let Err(Err(e)) = tx.send(result) {
                tracing::debug!(session = session_id, url = %url, error = %e, "unobserved push error");
            }
        }
        None => {
            if let Err(e) = result {
                tracing::debug!(session = session_id, url = %url, error = %e, "push error after response");
            }
        }
    }
}
