use crate::base::neterror::NetError;
use crate::base::origin::Origin;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A connection that can be parked in the pool between requests.
pub trait Poolable: Send + Sync + 'static {
    /// Whether the connection can serve another request.
    fn is_reusable(&self) -> bool;
}

/// Result of asking the pool for a connection.
pub enum Checkout<T: Poolable> {
    /// An idle connection, now leased to the caller.
    Reuse(Pooled<T>),
    /// No idle connection, but a slot under the per-origin cap is reserved
    /// for a connection the caller creates.
    Create(Reservation<T>),
    /// The origin is at its cap; the caller has to queue.
    Full,
}

impl<T: Poolable> fmt::Debug for Checkout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkout::Reuse(p) => f.debug_tuple("Reuse").field(p).finish(),
            Checkout::Create(r) => f.debug_tuple("Create").field(r).finish(),
            Checkout::Full => f.write_str("Full"),
        }
    }
}

/// Idle connection with metadata for timeout tracking.
struct IdleSocket<T> {
    value: T,
    /// When this connection was returned to the pool
    idle_since: Instant,
}

/// Per-origin state tracking.
struct Group<T: Poolable> {
    idle_sockets: VecDeque<IdleSocket<T>>,
    /// Leased connections plus reserved slots.
    active_count: usize,
    waiters: VecDeque<oneshot::Sender<Checkout<T>>>,
    /// Bumped on close; leases from an older generation are discarded on release.
    generation: u64,
}

impl<T: Poolable> Group<T> {
    fn new() -> Self {
        Self {
            idle_sockets: VecDeque::new(),
            active_count: 0,
            waiters: VecDeque::new(),
            generation: 0,
        }
    }

    fn pop_live_waiter(&mut self) -> Option<oneshot::Sender<Checkout<T>>> {
        while let Some(waiter) = self.waiters.pop_front() {
            if !waiter.is_closed() {
                return Some(waiter);
            }
        }
        None
    }
}

enum Slot<T> {
    Idle(T, u64),
    Fresh,
    Full,
}

struct PoolInner<T: Poolable> {
    max_sockets_per_group: usize,
    idle_timeout: Duration,
    groups: DashMap<Origin, Group<T>>,
}

impl<T: Poolable> PoolInner<T> {
    fn take_slot(&self, group: &mut Group<T>) -> Slot<T> {
        let now = Instant::now();

        // 1. Most recently parked connection first
        while let Some(idle) = group.idle_sockets.pop_back() {
            if now.duration_since(idle.idle_since) < self.idle_timeout && idle.value.is_reusable()
            {
                group.active_count += 1;
                return Slot::Idle(idle.value, group.generation);
            }
            // Dead or expired, dropped here
        }

        // 2. Check limits
        if group.active_count < self.max_sockets_per_group {
            group.active_count += 1;
            return Slot::Fresh;
        }

        Slot::Full
    }

    fn checkout(self: &Arc<Self>, origin: &Origin, slot: Slot<T>) -> Checkout<T> {
        match slot {
            Slot::Idle(value, generation) => {
                tracing::trace!(origin = %origin, "reusing idle HTTP/1 connection");
                Checkout::Reuse(Pooled::new(Arc::clone(self), origin.clone(), generation, value))
            }
            Slot::Fresh => Checkout::Create(Reservation::new(Arc::clone(self), origin.clone())),
            Slot::Full => Checkout::Full,
        }
    }

    fn generation(&self, origin: &Origin) -> u64 {
        self.groups.get(origin).map(|g| g.generation).unwrap_or(0)
    }

    /// Return a leased connection. Hands it to the oldest waiter if there is
    /// one, parks it otherwise.
    fn put_back(self: &Arc<Self>, origin: &Origin, generation: u64, value: T) {
        let mut group = self.groups.entry(origin.clone()).or_insert_with(Group::new);

        if generation != group.generation || !value.is_reusable() {
            drop(group);
            drop(value);
            self.release_slot(origin);
            return;
        }

        if let Some(waiter) = group.pop_live_waiter() {
            // The slot moves to the waiter, active_count is unchanged
            drop(group);
            let pooled = Pooled::new(Arc::clone(self), origin.clone(), generation, value);
            // A waiter that gave up in the meantime drops the lease, which
            // comes straight back here
            let _ = waiter.send(Checkout::Reuse(pooled));
            return;
        }

        group.active_count = group.active_count.saturating_sub(1);
        group.idle_sockets.push_back(IdleSocket { value, idle_since: Instant::now() });
    }

    /// Free a slot whose connection is gone. A waiter, if any, gets the slot
    /// to create a connection of its own.
    fn release_slot(self: &Arc<Self>, origin: &Origin) {
        let waiter = {
            let mut group = self.groups.entry(origin.clone()).or_insert_with(Group::new);
            group.active_count = group.active_count.saturating_sub(1);

            if group.active_count < self.max_sockets_per_group {
                let waiter = group.pop_live_waiter();
                if waiter.is_some() {
                    group.active_count += 1;
                }
                waiter
            } else {
                None
            }
        };

        if let Some(waiter) = waiter {
            let _ = waiter.send(Checkout::Create(Reservation::new(Arc::clone(self), origin.clone())));
        }
    }
}

/// Per-origin pool of HTTP/1 connections, enforcing Chromium-like limits:
/// at most `max_sockets_per_group` connections per origin, extra demand is
/// queued FIFO until a connection or slot frees up.
pub struct SocketPool<T: Poolable> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Poolable> Clone for SocketPool<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Poolable> fmt::Debug for SocketPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketPool")
            .field("max_sockets_per_group", &self.inner.max_sockets_per_group)
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("total_active", &self.total_active_count())
            .finish()
    }
}

impl<T: Poolable> Default for SocketPool<T> {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(300))
    }
}

impl<T: Poolable> SocketPool<T> {
    pub fn new(max_sockets_per_group: usize, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_sockets_per_group: max_sockets_per_group.max(1),
                idle_timeout,
                groups: DashMap::new(),
            }),
        }
    }

    /// Ask for a connection without waiting.
    pub fn get_free_socket(&self, origin: &Origin) -> Checkout<T> {
        let slot = {
            let mut group = self.inner.groups.entry(origin.clone()).or_insert_with(Group::new);
            self.inner.take_slot(&mut group)
        };
        self.inner.checkout(origin, slot)
    }

    /// Queue for a connection. Resolves with either a connection released by
    /// another request or a reserved slot freed by a discarded one; never
    /// with [`Checkout::Full`].
    pub async fn wait_for_socket(&self, origin: &Origin) -> Result<Checkout<T>, NetError> {
        let rx = {
            let mut group = self.inner.groups.entry(origin.clone()).or_insert_with(Group::new);
            match self.inner.take_slot(&mut group) {
                Slot::Full => {
                    let (tx, rx) = oneshot::channel();
                    group.waiters.push_back(tx);
                    rx
                }
                slot => {
                    drop(group);
                    return Ok(self.inner.checkout(origin, slot));
                }
            }
        };

        tracing::debug!(origin = %origin, "HTTP/1 pool full, request queued");
        rx.await.map_err(|_| NetError::ConnectionAborted)
    }

    /// Register a connection created outside a reservation (e.g. after ALPN
    /// settled on HTTP/1) and lease it to the caller. The cap is not checked.
    pub fn add_used_socket(&self, origin: &Origin, value: T) -> Pooled<T> {
        let generation = {
            let mut group = self.inner.groups.entry(origin.clone()).or_insert_with(Group::new);
            group.active_count += 1;
            group.generation
        };
        Pooled::new(Arc::clone(&self.inner), origin.clone(), generation, value)
    }

    /// Close the idle connections of `origin`; leased ones are closed when
    /// released instead of being parked.
    pub fn close_specific(&self, origin: &Origin) -> usize {
        let idle = match self.inner.groups.get_mut(origin) {
            Some(mut group) => {
                group.generation += 1;
                std::mem::take(&mut group.idle_sockets)
            }
            None => return 0,
        };
        tracing::debug!(origin = %origin, closed = idle.len(), "closing HTTP/1 connections");
        idle.len()
    }

    /// [`SocketPool::close_specific`] for every origin.
    pub fn close_all(&self) -> usize {
        let origins: Vec<Origin> = self.inner.groups.iter().map(|g| g.key().clone()).collect();
        origins.iter().map(|origin| self.close_specific(origin)).sum()
    }

    /// Get number of queued requests for an origin.
    pub fn pending_request_count(&self, origin: &Origin) -> usize {
        self.inner.groups.get(origin).map(|g| g.waiters.len()).unwrap_or(0)
    }

    /// Leased connections plus reserved slots for an origin.
    pub fn active_count(&self, origin: &Origin) -> usize {
        self.inner.groups.get(origin).map(|g| g.active_count).unwrap_or(0)
    }

    /// Get total active count across all origins.
    pub fn total_active_count(&self) -> usize {
        self.inner.groups.iter().map(|g| g.active_count).sum()
    }

    /// Get total idle connection count across all origins.
    pub fn idle_socket_count(&self) -> usize {
        self.inner.groups.iter().map(|g| g.idle_sockets.len()).sum()
    }

    /// Drop idle connections past the idle timeout or no longer reusable,
    /// and forget origins with nothing left.
    pub fn cleanup_idle_sockets(&self) {
        let now = Instant::now();
        let idle_timeout = self.inner.idle_timeout;

        self.inner.groups.retain(|_, group| {
            group.idle_sockets.retain(|idle| {
                now.duration_since(idle.idle_since) < idle_timeout && idle.value.is_reusable()
            });
            // No leases are out, so a bumped generation has nothing left to discard
            !(group.idle_sockets.is_empty() && group.active_count == 0 && group.waiters.is_empty())
        });
    }

    /// Start a background task to periodically clean up idle connections.
    /// The task ends once the pool is dropped.
    pub fn start_cleanup_task(&self, interval: Duration) {
        let pool: Weak<PoolInner<T>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match pool.upgrade() {
                    Some(inner) => SocketPool { inner }.cleanup_idle_sockets(),
                    None => break,
                }
            }
        });
    }
}

/// A leased connection. Dropping it returns the connection to the pool.
pub struct Pooled<T: Poolable> {
    value: Option<T>,
    origin: Origin,
    generation: u64,
    pool: Arc<PoolInner<T>>,
}

impl<T: Poolable> Pooled<T> {
    fn new(pool: Arc<PoolInner<T>>, origin: Origin, generation: u64, value: T) -> Self {
        Self { value: Some(value), origin, generation, pool }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Close the connection instead of returning it, freeing its slot.
    pub fn discard(mut self) {
        if self.value.take().is_some() {
            self.pool.release_slot(&self.origin);
        }
    }
}

impl<T: Poolable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value is present until drop")
    }
}

impl<T: Poolable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value is present until drop")
    }
}

impl<T: Poolable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put_back(&self.origin, self.generation, value);
        }
    }
}

impl<T: Poolable> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").field("origin", &self.origin).finish()
    }
}

/// A reserved slot under the per-origin cap. Dropping it unfulfilled frees
/// the slot.
pub struct Reservation<T: Poolable> {
    pool: Arc<PoolInner<T>>,
    origin: Origin,
    fulfilled: bool,
}

impl<T: Poolable> Reservation<T> {
    fn new(pool: Arc<PoolInner<T>>, origin: Origin) -> Self {
        Self { pool, origin, fulfilled: false }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Fill the slot with a freshly created connection.
    pub fn fulfill(mut self, value: T) -> Pooled<T> {
        self.fulfilled = true;
        let generation = self.pool.generation(&self.origin);
        Pooled::new(Arc::clone(&self.pool), self.origin.clone(), generation, value)
    }
}

impl<T: Poolable> Drop for Reservation<T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.pool.release_slot(&self.origin);
        }
    }
}

impl<T: Poolable> fmt::Debug for Reservation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("origin", &self.origin).finish()
    }
}
