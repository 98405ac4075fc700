use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fetchnet::base::origin::Origin;
use fetchnet::config::PerOrigin;
use fetchnet::session::{
    SessionConnector, SessionControl, SessionEvent, SessionOptions, SessionRegistry,
    SessionTransport,
};
use fetchnet::socket::pool::{Checkout, Poolable, SocketPool};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Conn;

impl Poolable for Conn {
    fn is_reusable(&self) -> bool {
        true
    }
}

/// Transport that connects at once and never closes.
struct Immediate {
    // Held so the event channel stays open
    _events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionControl for Immediate {
    fn set_keep_alive(&self, _keep_alive: bool) {}

    fn is_destroyed(&self) -> bool {
        false
    }

    fn destroy(&self) {}

    fn closed(&self) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

struct ImmediateConnector;

impl SessionConnector for ImmediateConnector {
    fn open(&self, _origin: &Origin, _options: &SessionOptions) -> SessionTransport {
        let (tx, events) = mpsc::unbounded_channel();
        let _ = tx.send(SessionEvent::Connected);
        SessionTransport { control: Arc::new(Immediate { _events: tx }), events }
    }
}

/// In-memory checkout and release through the HTTP/1 pool.
fn benchmark_pool_operations(c: &mut Criterion) {
    let pool: SocketPool<Conn> = SocketPool::new(6, Duration::from_secs(300));
    let origin = Origin::parse("https://example.com").unwrap();

    // Park one connection so checkouts hit the idle list
    if let Checkout::Create(reservation) = pool.get_free_socket(&origin) {
        drop(reservation.fulfill(Conn));
    }

    c.bench_function("pool_checkout_release", |b| {
        b.iter(|| {
            let checkout = pool.get_free_socket(black_box(&origin));
            drop(black_box(checkout));
        })
    });

    c.bench_function("pool_reserve_cancel", |b| {
        let other = Origin::parse("https://other.example").unwrap();
        b.iter(|| drop(black_box(pool.get_free_socket(&other))))
    });

    c.bench_function("pool_stats", |b| {
        b.iter(|| {
            let _ = black_box(pool.total_active_count());
            let _ = black_box(pool.pending_request_count(&origin));
            let _ = black_box(pool.idle_socket_count());
        })
    });
}

/// Joining an established session and handing the lease back.
fn benchmark_session_registry(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let origin = Origin::parse("https://example.com").unwrap();
    let sessions =
        SessionRegistry::new(Arc::new(ImmediateConnector), PerOrigin::default(), PerOrigin::Value(Vec::new()));

    let first = runtime.block_on(async {
        let lease = sessions.acquire_session(&origin, None);
        lease.session().await.unwrap();
        lease
    });

    c.bench_function("registry_join_release", |b| {
        b.to_async(&runtime).iter(|| async {
            let lease = sessions.acquire_session(black_box(&origin), None);
            black_box(lease.session().await.unwrap());
        })
    });

    drop(first);
}

criterion_group!(benches, benchmark_pool_operations, benchmark_session_registry);
criterion_main!(benches);
