use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::http::{RequestBody, ResponseBody};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Control surface of one HTTP/2 session transport.
pub trait SessionControl: Send + Sync + 'static {
    /// Liveness hint: `false` marks the transport idle, `true` marks it in use.
    /// Never closes anything.
    fn set_keep_alive(&self, keep_alive: bool);

    fn is_destroyed(&self) -> bool;

    /// Start tearing the transport down. Idempotent.
    fn destroy(&self);

    /// Resolves once the transport is fully closed.
    fn closed(&self) -> BoxFuture<'static, ()>;

    /// Open a stream and exchange one request.
    fn send_request(
        &self,
        _request: http::Request<RequestBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, NetError>> {
        Box::pin(async { Err(NetError::Http2StreamClosed) })
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct HandleInner {
    id: u64,
    origin: Origin,
    control: Arc<dyn SessionControl>,
    refs: Mutex<usize>,
    gone_away: AtomicBool,
}

/// Shared handle to one HTTP/2 session.
///
/// Carries the session's reference count. The count starts at 1 for the
/// party that created the session; it only drives the keep-alive hint of
/// the transport and never closes it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub fn new(origin: Origin, control: Arc<dyn SessionControl>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                origin,
                control,
                refs: Mutex::new(1),
                gone_away: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn control(&self) -> &Arc<dyn SessionControl> {
        &self.inner.control
    }

    /// Take a reference. On 0 -> 1 the transport is marked keep-alive again.
    pub fn add_ref(&self) {
        let mut refs = self.inner.refs.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.control.is_destroyed() {
            return;
        }
        *refs += 1;
        if *refs == 1 {
            self.inner.control.set_keep_alive(true);
        }
    }

    /// Drop a reference. On reaching 0 the transport is marked idle.
    pub fn unref(&self) {
        let mut refs = self.inner.refs.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.control.is_destroyed() || *refs == 0 {
            return;
        }
        *refs -= 1;
        if *refs == 0 {
            tracing::trace!(session = self.inner.id, origin = %self.inner.origin, "session idle");
            self.inner.control.set_keep_alive(false);
        }
    }

    pub fn ref_count(&self) -> usize {
        *self.inner.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.control.is_destroyed()
    }

    /// Whether the server sent GOAWAY on this session.
    pub fn has_gone_away(&self) -> bool {
        self.inner.gone_away.load(Ordering::Acquire)
    }

    pub(crate) fn mark_gone_away(&self) {
        self.inner.gone_away.store(true, Ordering::Release);
    }

    /// Whether both handles refer to the same session.
    pub fn same(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn send_request(
        &self,
        request: http::Request<RequestBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, NetError>> {
        self.inner.control.send_request(request)
    }

    /// Destroy the transport and wait until it is closed.
    pub async fn destroy(&self) {
        self.inner.control.destroy();
        self.inner.control.closed().await;
        tracing::debug!(session = self.inner.id, origin = %self.inner.origin, "session closed");
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin)
            .field("refs", &self.ref_count())
            .field("gone_away", &self.has_gone_away())
            .finish()
    }
}
