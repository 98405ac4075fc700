//! HTTP/2 session transport over the `http2` crate.

use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::config::HttpProtocol;
use crate::http::h2settings::H2Settings;
use crate::http::{RequestBody, ResponseBody};
use crate::session::handle::SessionControl;
use crate::session::options::SessionOptions;
use crate::session::push::{PushEvent, PushedStream};
use crate::session::transport::{SessionConnector, SessionEvent, SessionTransport};
use crate::socket::connectjob::ConnectJob;
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::{SecureConnector, TlsConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use http2::client::{Builder, Connection, ResponseFuture, SendRequest};
use http2::Reason;
use std::future::{poll_fn, Future};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use tokio::sync::{mpsc, watch, Notify};
use url::Url;

/// [`SessionConnector`] speaking HTTP/2 over TCP or TLS.
#[derive(Clone)]
pub struct H2Connector {
    secure: Arc<dyn SecureConnector>,
    tls: TlsConfig,
}

impl std::fmt::Debug for H2Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2Connector").field("tls", &self.tls).finish()
    }
}

impl H2Connector {
    pub fn new(secure: Arc<dyn SecureConnector>, tls: TlsConfig) -> Self {
        Self { secure, tls }
    }

    /// Socket for a new session: the pre-connected one if given, otherwise
    /// TCP for `http:` and TLS with ALPN `h2` for `https:`.
    async fn dial(&self, origin: &Origin, options: &SessionOptions) -> Result<BoxedSocket, NetError> {
        if let Some(socket) = options.transport.as_ref().and_then(|t| t.take()) {
            return Ok(socket);
        }

        let url = Url::parse(origin.as_str()).map_err(|_| NetError::InvalidUrl)?;
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        if !origin.is_secure() {
            return ConnectJob::connect(host, port, None).await;
        }

        let mut tls = self.tls.clone();
        if let Some(reject) = options.reject_unauthorized {
            tls.reject_unauthorized = reject;
        }
        let negotiated = self.secure.connect(host, port, &[HttpProtocol::Http2], &tls).await?;
        if negotiated.protocol != HttpProtocol::Http2 {
            tracing::debug!(origin = %origin, protocol = %negotiated.protocol, "server refused h2");
            return Err(NetError::AlpnNegotiationFailed);
        }
        Ok(negotiated.socket)
    }

    async fn handshake(
        &self,
        origin: &Origin,
        options: &SessionOptions,
    ) -> Result<(SendRequest<Bytes>, Connection<BoxedSocket, Bytes>), NetError> {
        let socket = self.dial(origin, options).await?;
        let settings = options.settings.unwrap_or_default();
        settings_builder(&settings).handshake::<_, Bytes>(socket).await.map_err(|e| {
            tracing::debug!(origin = %origin, error = %e, "HTTP/2 handshake failed");
            NetError::Http2ProtocolError
        })
    }
}

fn settings_builder(settings: &H2Settings) -> Builder {
    let mut builder = Builder::new();
    builder
        .header_table_size(settings.header_table_size)
        .enable_push(settings.enable_push)
        .initial_window_size(settings.initial_window_size)
        .max_frame_size(settings.max_frame_size);
    if settings.max_concurrent_streams > 0 {
        builder.max_concurrent_streams(settings.max_concurrent_streams);
    }
    if settings.max_header_list_size > 0 {
        builder.max_header_list_size(settings.max_header_list_size);
    }
    builder
}

impl SessionConnector for H2Connector {
    fn open(&self, origin: &Origin, options: &SessionOptions) -> SessionTransport {
        let (events_tx, events) = mpsc::unbounded_channel();
        let control = Arc::new(H2Control::new(events_tx.clone()));

        tokio::spawn(run_session(
            self.clone(),
            origin.clone(),
            options.clone(),
            Arc::clone(&control),
            events_tx,
        ));

        SessionTransport { control, events }
    }
}

async fn run_session(
    connector: H2Connector,
    origin: Origin,
    options: SessionOptions,
    control: Arc<H2Control>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let connect = async {
        match options.connect_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, connector.handshake(&origin, &options)).await {
                    Ok(result) => result.map_err(Some),
                    Err(_) => Err(None),
                }
            }
            None => connector.handshake(&origin, &options).await.map_err(Some),
        }
    };

    let outcome = tokio::select! {
        _ = control.shutdown.notified() => {
            control.finish();
            let _ = events.send(SessionEvent::Close);
            return;
        }
        outcome = connect => outcome,
    };

    let (sender, connection) = match outcome {
        Ok(pair) => pair,
        Err(None) => {
            let _ = events.send(SessionEvent::Timeout);
            control.finish();
            return;
        }
        Err(Some(e)) => {
            let _ = events.send(SessionEvent::Error(e));
            control.finish();
            return;
        }
    };

    let mut watcher = Some(sender.clone());
    *control.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    if control.is_destroyed() {
        control.finish();
        let _ = events.send(SessionEvent::Close);
        return;
    }
    let _ = events.send(SessionEvent::Connected);

    // After a graceful GOAWAY the connection keeps serving its open streams,
    // so the peer's GOAWAY shows up on the request handle long before the
    // connection future resolves.
    let mut goaway_reported = false;
    let result = {
        let mut connection = pin!(connection);
        let driven = poll_fn(|cx| {
            let result = connection.as_mut().poll(cx);
            if let Some(sender) = watcher.as_mut() {
                if let Poll::Ready(Err(e)) = sender.poll_ready(cx) {
                    if e.is_go_away() {
                        tracing::debug!(origin = %origin, "GOAWAY received");
                        let _ = events.send(goaway_event(&e));
                        goaway_reported = true;
                    }
                    watcher = None;
                }
            }
            result
        });

        tokio::select! {
            _ = control.shutdown.notified() => None,
            result = driven => Some(result),
        }
    };
    drop(watcher);
    match result {
        None | Some(Ok(())) => {}
        Some(Err(e)) if e.is_go_away() => {
            if !goaway_reported {
                let _ = events.send(goaway_event(&e));
            }
        }
        Some(Err(e)) => {
            tracing::warn!(origin = %origin, error = %e, "HTTP/2 connection error");
            let _ = events.send(SessionEvent::Error(map_h2_error(&e)));
        }
    }

    control.finish();
    let _ = events.send(SessionEvent::Close);
}

fn goaway_event(e: &http2::Error) -> SessionEvent {
    SessionEvent::GoAway {
        error_code: e.reason().map(u32::from).unwrap_or(0),
        last_stream_id: 0,
    }
}

fn map_h2_error(e: &http2::Error) -> NetError {
    if e.is_go_away() {
        NetError::Http2ServerRefusedStream
    } else if e.reason() == Some(Reason::NO_ERROR) {
        NetError::Http2RstStreamNoErrorReceived
    } else if e.reason() == Some(Reason::REFUSED_STREAM) {
        NetError::Http2ServerRefusedStream
    } else if e.is_io() {
        NetError::ConnectionReset
    } else {
        NetError::Http2ProtocolError
    }
}

struct H2Control {
    sender: Mutex<Option<SendRequest<Bytes>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: Notify,
    destroyed: AtomicBool,
    closed: watch::Sender<bool>,
}

impl H2Control {
    fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            sender: Mutex::new(None),
            events,
            shutdown: Notify::new(),
            destroyed: AtomicBool::new(false),
            closed: watch::channel(false).0,
        }
    }

    /// The transport is gone.
    fn finish(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.closed.send_replace(true);
    }
}

impl SessionControl for H2Control {
    fn set_keep_alive(&self, keep_alive: bool) {
        // Nothing to toggle on a tokio transport
        tracing::trace!(keep_alive, "session liveness hint");
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
            self.shutdown.notify_one();
        }
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut closed = self.closed.subscribe();
        Box::pin(async move {
            let _ = closed.wait_for(|closed| *closed).await;
        })
    }

    fn send_request(
        &self,
        request: http::Request<RequestBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, NetError>> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let events = self.events.clone();

        Box::pin(async move {
            let sender = sender.ok_or(NetError::Http2StreamClosed)?;
            let refused = |e: http2::Error| {
                if e.is_go_away() {
                    let _ = events.send(goaway_event(&e));
                }
                map_h2_error(&e)
            };

            let mut sender = sender.ready().await.map_err(refused)?;

            let (parts, body) = request.into_parts();
            let data = body.into_data();
            let (mut response, mut stream) = sender
                .send_request(http::Request::from_parts(parts, ()), data.is_none())
                .map_err(refused)?;
            if let Some(data) = data {
                stream.send_data(data, true).map_err(|e| map_h2_error(&e))?;
            }

            forward_pushes(&mut response, events.clone());

            let response = response.await.map_err(refused)?;
            Ok(response.map(ResponseBody::Http2))
        })
    }
}

/// Relay the server pushes promised on a request's stream as session events.
fn forward_pushes(response: &mut ResponseFuture, events: mpsc::UnboundedSender<SessionEvent>) {
    let mut promises = response.push_promises();
    tokio::spawn(async move {
        while let Some(promise) = promises.push_promise().await {
            let promise = match promise {
                Ok(promise) => promise,
                Err(e) => {
                    tracing::debug!(error = %e, "push promise failed");
                    break;
                }
            };

            let (request, pushed) = promise.into_parts();
            let (stream, tx) = PushedStream::new(promised_headers(&request));
            if events.send(SessionEvent::Push(stream)).is_err() {
                break;
            }

            tokio::spawn(async move {
                let event = match pushed.await {
                    Ok(response) => PushEvent::Response(response.map(ResponseBody::Http2)),
                    Err(e) if e.reason() == Some(Reason::CANCEL) => PushEvent::Aborted,
                    Err(e) if e.is_reset() => {
                        PushEvent::Error(NetError::Http2ClaimedPushedStreamResetByServer)
                    }
                    Err(_) => PushEvent::FrameError,
                };
                let _ = tx.send(event);
                let _ = tx.send(PushEvent::Close);
            });
        }
    });
}

/// Header list of a promised request, pseudo-headers first.
fn promised_headers(request: &http::Request<()>) -> Vec<(String, String)> {
    let uri = request.uri();
    let mut headers = vec![(":method".to_string(), request.method().to_string())];
    if let Some(scheme) = uri.scheme_str() {
        headers.push((":scheme".to_string(), scheme.to_string()));
    }
    if let Some(authority) = uri.authority() {
        headers.push((":authority".to_string(), authority.to_string()));
    }
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    headers.push((":path".to_string(), path.to_string()));

    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.push((name.as_str().to_string(), value.to_string()));
        }
    }
    headers
}
