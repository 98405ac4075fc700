//! Per-origin HTTP/2 session registry.
//!
//! Based on Chromium's SpdySessionPool: at most one active session per
//! origin, sessions that received GOAWAY move to a stale set where they
//! finish their open streams until drained.

use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use crate::config::{Decoders, PerOrigin};
use crate::session::handle::SessionHandle;
use crate::session::options::SessionOptions;
use crate::session::push::{self, PushHandler};
use crate::session::transport::{SessionConnector, SessionEvent};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::{mpsc, oneshot};

type Establishment = Shared<BoxFuture<'static, Result<SessionHandle, NetError>>>;

/// The registry's record of the active session of an origin.
#[derive(Clone)]
struct SessionItem {
    handle: SessionHandle,
    established: Establishment,
}

struct RegistryInner {
    active: DashMap<Origin, SessionItem>,
    stale: DashMap<Origin, Vec<SessionHandle>>,
    connector: Arc<dyn SessionConnector>,
    session_options: PerOrigin<SessionOptions>,
    decoders: PerOrigin<Decoders>,
    push_handler: RwLock<Option<PushHandler>>,
}

impl RegistryInner {
    /// Remove `handle` from the active slot if it still holds it.
    fn remove_active(&self, origin: &Origin, handle: &SessionHandle) -> bool {
        self.active.remove_if(origin, |_, item| item.handle.same(handle)).is_some()
    }

    fn remove_stale(&self, origin: &Origin, handle: &SessionHandle) {
        if let Some(mut stale) = self.stale.get_mut(origin) {
            stale.retain(|h| !h.same(handle));
        }
        self.stale.remove_if(origin, |_, stale| stale.is_empty());
    }

    /// Move `handle` from the active slot to the stale set.
    fn retire(&self, origin: &Origin, handle: &SessionHandle) {
        if self.remove_active(origin, handle) {
            self.stale.entry(origin.clone()).or_default().push(handle.clone());
            tracing::debug!(origin = %origin, session = handle.id(), "session is stale");
        }
    }

    fn forget(&self, origin: &Origin, handle: &SessionHandle) {
        self.remove_active(origin, handle);
        self.remove_stale(origin, handle);
    }

    fn push_handler(&self) -> Option<PushHandler> {
        self.push_handler.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Registry of HTTP/2 sessions, keyed by origin.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active", &self.active_origins())
            .field("stale", &self.inner.stale.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        session_options: PerOrigin<SessionOptions>,
        decoders: PerOrigin<Decoders>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                active: DashMap::new(),
                stale: DashMap::new(),
                connector,
                session_options,
                decoders,
                push_handler: RwLock::new(None),
            }),
        }
    }

    /// Whether `origin` has an active session (connecting or established).
    pub fn has_origin(&self, origin: &Origin) -> bool {
        self.inner.active.contains_key(origin)
    }

    /// Join the active session of `origin`, or open one.
    ///
    /// Joining takes a reference on the session; a new session starts with
    /// the caller's reference. Either way the lease gives it back.
    ///
    /// Must be called within a tokio runtime, since opening a session spawns
    /// its driver task. The connector runs while the origin's map entry is
    /// locked, see [`SessionConnector::open`].
    pub fn acquire_session(&self, origin: &Origin, extra: Option<&SessionOptions>) -> SessionLease {
        match self.inner.active.entry(origin.clone()) {
            Entry::Occupied(entry) => {
                let item = entry.get().clone();
                item.handle.add_ref();
                tracing::trace!(origin = %origin, session = item.handle.id(), "joining session");
                SessionLease::new(item, false)
            }
            Entry::Vacant(entry) => {
                let base = self.inner.session_options.get(origin);
                let options = match extra {
                    Some(extra) => base.merge(extra),
                    None => base,
                };

                let transport = self.inner.connector.open(origin, &options);
                let handle = SessionHandle::new(origin.clone(), transport.control);

                let (tx, rx) = oneshot::channel();
                let established: Establishment = rx
                    .map(|r| r.unwrap_or(Err(NetError::ConnectionClosed)))
                    .boxed()
                    .shared();

                let item = SessionItem { handle: handle.clone(), established };
                entry.insert(item.clone());
                tracing::debug!(origin = %origin, session = handle.id(), "opening session");

                tokio::spawn(drive_session(
                    Arc::downgrade(&self.inner),
                    handle,
                    transport.events,
                    tx,
                ));
                SessionLease::new(item, true)
            }
        }
    }

    /// Move the active session of `origin`, if any, to the stale set.
    pub fn force_stale(&self, origin: &Origin) {
        if let Some((_, item)) = self.inner.active.remove(origin) {
            tracing::debug!(origin = %origin, session = item.handle.id(), "forcing session stale");
            self.inner.stale.entry(origin.clone()).or_default().push(item.handle);
        }
    }

    /// Move this specific session to the stale set and flag it as gone away.
    /// No-op unless it is the active session of its origin.
    pub fn retire(&self, handle: &SessionHandle) {
        handle.mark_gone_away();
        self.inner.retire(handle.origin(), handle);
    }

    /// Destroy `handle`, or every active and stale session of `origin` when
    /// no handle is given. Resolves once all of them are closed.
    pub async fn close_specific(&self, origin: &Origin, handle: Option<&SessionHandle>) {
        let doomed: Vec<SessionHandle> = match handle {
            Some(handle) => {
                self.inner.forget(origin, handle);
                vec![handle.clone()]
            }
            None => {
                let active = self.inner.active.remove(origin).map(|(_, item)| item.handle);
                let stale = self.inner.stale.remove(origin).map(|(_, v)| v).unwrap_or_default();
                active.into_iter().chain(stale).collect()
            }
        };
        destroy_all(doomed).await;
    }

    /// Destroy the stale sessions of `origin`.
    pub async fn drain_stale(&self, origin: &Origin) {
        let stale = self.inner.stale.remove(origin).map(|(_, v)| v).unwrap_or_default();
        if !stale.is_empty() {
            tracing::debug!(origin = %origin, count = stale.len(), "draining stale sessions");
        }
        destroy_all(stale).await;
    }

    /// Destroy every session of every origin.
    pub async fn close_all(&self) {
        let mut doomed = Vec::new();
        let origins: Vec<Origin> = self.inner.active.iter().map(|e| e.key().clone()).collect();
        for origin in origins {
            if let Some((_, item)) = self.inner.active.remove(&origin) {
                doomed.push(item.handle);
            }
        }
        let origins: Vec<Origin> = self.inner.stale.iter().map(|e| e.key().clone()).collect();
        for origin in origins {
            if let Some((_, stale)) = self.inner.stale.remove(&origin) {
                doomed.extend(stale);
            }
        }
        destroy_all(doomed).await;
    }

    /// Install or clear the push handler.
    pub fn set_push_handler(&self, handler: Option<PushHandler>) {
        *self.inner.push_handler.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    pub fn stale_count(&self, origin: &Origin) -> usize {
        self.inner.stale.get(origin).map(|s| s.len()).unwrap_or(0)
    }

    pub fn active_origins(&self) -> Vec<Origin> {
        let mut origins: Vec<Origin> = self.inner.active.iter().map(|e| e.key().clone()).collect();
        origins.sort();
        origins
    }

    /// The active session of `origin`, established or not.
    pub fn active_handle(&self, origin: &Origin) -> Option<SessionHandle> {
        self.inner.active.get(origin).map(|item| item.handle.clone())
    }
}

async fn destroy_all(handles: Vec<SessionHandle>) {
    join_all(handles.iter().map(|h| h.destroy())).await;
}

/// Runs one session through `Connecting -> Established -> {GoneAway, Closed}`.
async fn drive_session(
    registry: Weak<RegistryInner>,
    handle: SessionHandle,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    established: oneshot::Sender<Result<SessionHandle, NetError>>,
) {
    let origin = handle.origin().clone();

    let connected = loop {
        match events.recv().await {
            Some(SessionEvent::Connected) => break Ok(()),
            Some(SessionEvent::Timeout) => break Err(NetError::ConnectionTimedOut),
            Some(SessionEvent::Error(e)) => break Err(e),
            Some(SessionEvent::Close) | None => break Err(NetError::ConnectionClosed),
            Some(SessionEvent::GoAway { error_code, .. }) => {
                tracing::debug!(origin = %origin, error_code, "GOAWAY while connecting");
            }
            Some(SessionEvent::Push(_)) => {}
        }
    };

    if let Err(e) = connected {
        if let Some(inner) = registry.upgrade() {
            inner.remove_active(&origin, &handle);
        }
        handle.control().destroy();
        tracing::debug!(origin = %origin, session = handle.id(), error = %e, "session failed to connect");
        let _ = established.send(Err(e));
        return;
    }

    tracing::debug!(origin = %origin, session = handle.id(), "session established");
    let _ = established.send(Ok(handle.clone()));

    while let Some(event) = events.recv().await {
        let Some(inner) = registry.upgrade() else {
            handle.control().destroy();
            return;
        };
        match event {
            SessionEvent::Push(stream) => {
                push::dispatch(inner.push_handler(), &handle, inner.decoders.get(&origin), stream);
            }
            SessionEvent::GoAway { error_code, last_stream_id } => {
                tracing::debug!(
                    origin = %origin,
                    session = handle.id(),
                    error_code,
                    last_stream_id,
                    "GOAWAY received"
                );
                handle.mark_gone_away();
                inner.retire(&origin, &handle);
            }
            SessionEvent::Error(e) => {
                tracing::debug!(origin = %origin, session = handle.id(), error = %e, "session error");
            }
            SessionEvent::Close => break,
            SessionEvent::Connected | SessionEvent::Timeout => {}
        }
    }

    if let Some(inner) = registry.upgrade() {
        inner.forget(&origin, &handle);
    }
    tracing::debug!(origin = %origin, session = handle.id(), "session removed");
}

/// A caller's hold on a session. Released exactly once, on
/// [`SessionLease::release`] or drop.
pub struct SessionLease {
    created_here: bool,
    handle: SessionHandle,
    established: Establishment,
    released: AtomicBool,
}

impl SessionLease {
    fn new(item: SessionItem, created_here: bool) -> Self {
        Self {
            created_here,
            handle: item.handle,
            established: item.established,
            released: AtomicBool::new(false),
        }
    }

    /// Whether this call started the session's establishment.
    pub fn created_here(&self) -> bool {
        self.created_here
    }

    /// Wait for the session to be established.
    pub async fn session(&self) -> Result<SessionHandle, NetError> {
        self.established.clone().await
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Give the reference back. Later calls do nothing.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.handle.unref();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("created_here", &self.created_here)
            .field("handle", &self.handle)
            .field("released", &self.is_released())
            .finish()
    }
}
