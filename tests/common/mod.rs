//! Shared test doubles: a scripted HTTP/2 session transport, a TLS
//! connector over in-memory pipes and a tiny HTTP/1 responder.

#![allow(dead_code)]

use bytes::Bytes;
use fetchnet::base::neterror::NetError;
use fetchnet::base::origin::Origin;
use fetchnet::config::HttpProtocol;
use fetchnet::http::connection::Http1Connection;
use fetchnet::http::fetch::{FetchContext, Fetcher, HyperFetcher};
use fetchnet::http::streamfactory::Http2SessionGetter;
use fetchnet::http::{HttpResponse, RequestBody, ResponseBody};
use fetchnet::session::{
    SessionConnector, SessionControl, SessionEvent, SessionOptions, SessionTransport,
};
use fetchnet::socket::pool::Pooled;
use fetchnet::socket::stream::BoxedSocket;
use fetchnet::socket::tls::{Negotiated, SecureConnector, TlsConfig};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Semaphore};

/// What a [`MockConnector`] does with the next session it opens.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Connect,
    Fail(NetError),
    Timeout,
    CloseBeforeConnect,
    /// Nothing happens until the test sends events itself.
    Manual,
}

/// Session transport double.
pub struct MockControl {
    pub label: String,
    pub destroyed: AtomicBool,
    pub keep_alive: Mutex<Vec<bool>>,
    /// Requests wait for a permit before they are answered.
    pub gate: Arc<Semaphore>,
    /// Refuse new streams as after a GOAWAY.
    pub refuse: AtomicBool,
    pub requests: AtomicUsize,
    /// `destroy` leaves the transport open until [`MockControl::finish_close`].
    pub defer_close: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: watch::Sender<bool>,
}

impl MockControl {
    fn new(
        label: String,
        events: mpsc::UnboundedSender<SessionEvent>,
        gated: bool,
        defer_close: bool,
    ) -> Self {
        let permits = if gated { 0 } else { Semaphore::MAX_PERMITS };
        Self {
            label,
            destroyed: AtomicBool::new(false),
            keep_alive: Mutex::new(Vec::new()),
            gate: Arc::new(Semaphore::new(permits)),
            refuse: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            defer_close,
            events,
            closed: watch::channel(false).0,
        }
    }

    pub fn keep_alive_log(&self) -> Vec<bool> {
        self.keep_alive.lock().unwrap().clone()
    }

    pub fn open_gate(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Let the transport report that it has fully closed.
    pub fn finish_close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl SessionControl for MockControl {
    fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.lock().unwrap().push(keep_alive);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::Close);
            if !self.defer_close {
                self.closed.send_replace(true);
            }
        }
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut closed = self.closed.subscribe();
        Box::pin(async move {
            let _ = closed.wait_for(|c| *c).await;
        })
    }

    fn send_request(
        &self,
        request: http::Request<RequestBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, NetError>> {
        if self.refuse.load(Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::GoAway { error_code: 0, last_stream_id: 0 });
            return Box::pin(async { Err(NetError::Http2ServerRefusedStream) });
        }
        if self.is_destroyed() {
            return Box::pin(async { Err(NetError::Http2StreamClosed) });
        }

        self.requests.fetch_add(1, Ordering::SeqCst);
        let gate = Arc::clone(&self.gate);
        let body = format!("{} {}", self.label, request.uri().path());
        Box::pin(async move {
            gate.acquire().await.map_err(|_| NetError::Aborted)?.forget();
            let response = http::Response::builder()
                .status(200)
                .version(http::Version::HTTP_2)
                .body(ResponseBody::Full(Bytes::from(body)))
                .map_err(|_| NetError::InvalidResponse)?;
            Ok(response)
        })
    }
}

/// One session opened by a [`MockConnector`].
#[derive(Clone)]
pub struct Opened {
    pub origin: Origin,
    pub control: Arc<MockControl>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub connect_timeout: Option<Duration>,
    /// Whether a pre-connected socket was handed over and taken.
    pub took_transport: bool,
}

/// Scripted [`SessionConnector`].
#[derive(Default)]
pub struct MockConnector {
    pub opened: Mutex<Vec<Opened>>,
    pub scripts: Mutex<VecDeque<Script>>,
    pub gated: AtomicBool,
    pub defer_close: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        let connector = Self::default();
        connector.gated.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    /// Sessions whose close completes only on [`MockControl::finish_close`].
    pub fn deferred_close() -> Arc<Self> {
        let connector = Self::default();
        connector.defer_close.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn session(&self, i: usize) -> Opened {
        self.opened.lock().unwrap()[i].clone()
    }
}

impl SessionConnector for MockConnector {
    fn open(&self, origin: &Origin, options: &SessionOptions) -> SessionTransport {
        let (tx, events) = mpsc::unbounded_channel();
        let mut opened = self.opened.lock().unwrap();
        let label = format!("session-{}", opened.len());
        let control = Arc::new(MockControl::new(
            label,
            tx.clone(),
            self.gated.load(Ordering::SeqCst),
            self.defer_close.load(Ordering::SeqCst),
        ));

        let took_transport =
            options.transport.as_ref().map(|t| t.take().is_some()).unwrap_or(false);
        opened.push(Opened {
            origin: origin.clone(),
            control: Arc::clone(&control),
            events: tx.clone(),
            connect_timeout: options.connect_timeout,
            took_transport,
        });

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Connect);
        match script {
            Script::Connect => {
                let _ = tx.send(SessionEvent::Connected);
            }
            Script::Fail(e) => {
                let _ = tx.send(SessionEvent::Error(e));
            }
            Script::Timeout => {
                let _ = tx.send(SessionEvent::Timeout);
            }
            Script::CloseBeforeConnect => {
                let _ = tx.send(SessionEvent::Close);
            }
            Script::Manual => {}
        }

        SessionTransport { control, events }
    }
}

/// [`SecureConnector`] handing out in-memory pipes. When it negotiates
/// HTTP/1 the far end is served by [`serve_http1`].
pub struct MockSecure {
    pub protocol: HttpProtocol,
    pub delay: Duration,
    pub connects: AtomicUsize,
    pub offered: Mutex<Vec<Vec<HttpProtocol>>>,
    /// `reject_unauthorized` of each connect, in order.
    pub verified: Mutex<Vec<bool>>,
}

impl MockSecure {
    pub fn new(protocol: HttpProtocol) -> Arc<Self> {
        Self::with_delay(protocol, Duration::ZERO)
    }

    pub fn with_delay(protocol: HttpProtocol, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            protocol,
            delay,
            connects: AtomicUsize::new(0),
            offered: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl SecureConnector for MockSecure {
    fn connect<'a>(
        &'a self,
        _hostname: &'a str,
        _port: u16,
        protocols: &'a [HttpProtocol],
        tls: &'a TlsConfig,
    ) -> BoxFuture<'a, Result<Negotiated, NetError>> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.offered.lock().unwrap().push(protocols.to_vec());
            self.verified.lock().unwrap().push(tls.reject_unauthorized);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let (client, server) = tokio::io::duplex(64 * 1024);
            if self.protocol == HttpProtocol::Http1 {
                tokio::spawn(serve_http1(server, "tls-h1"));
            }
            Ok(Negotiated { protocol: self.protocol, socket: BoxedSocket::new(client) })
        })
    }
}

/// Answer keep-alive HTTP/1.1 requests with `200 <body> <path>` until the
/// peer hangs up.
pub async fn serve_http1<S>(mut stream: S, body: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse().ok())?
            })
            .unwrap_or(0usize);
        while buf.len() < head_end + content_length {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        buf.drain(..head_end + content_length);

        let payload = format!("{} {}", body, path);
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\ncontent-type: text/plain\r\n\r\n{}",
            payload.len(),
            payload
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Delegates to [`HyperFetcher`] and counts which path each request took.
#[derive(Default)]
pub struct CountingFetcher {
    pub http1: AtomicUsize,
    pub http2: AtomicUsize,
}

impl CountingFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Fetcher for CountingFetcher {
    fn fetch_http1(
        &self,
        conn: Pooled<Http1Connection>,
        request: http::Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>> {
        self.http1.fetch_add(1, Ordering::SeqCst);
        HyperFetcher.fetch_http1(conn, request, ctx)
    }

    fn fetch_http2(
        &self,
        session: Http2SessionGetter,
        request: http::Request<RequestBody>,
        ctx: FetchContext,
    ) -> BoxFuture<'static, Result<HttpResponse, NetError>> {
        self.http2.fetch_add(1, Ordering::SeqCst);
        HyperFetcher.fetch_http2(session, request, ctx)
    }
}

/// Poll `cond` until it holds, yielding to other tasks in between.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

pub fn origin(s: &str) -> Origin {
    Origin::parse(s).unwrap()
}
