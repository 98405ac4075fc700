//! HTTP/2 session registry tests against a scripted transport.

mod common;

use common::{eventually, origin, MockConnector, Script};
use fetchnet::base::neterror::NetError;
use fetchnet::config::PerOrigin;
use fetchnet::http::streamfactory::Http2SessionGetter;
use fetchnet::http::ResponseBody;
use fetchnet::session::{
    PushEvent, PushedRequest, PushedResponse, PushedStream, SessionControl, SessionEvent,
    SessionOptions, SessionRegistry,
};
use fetchnet::socket::stream::BoxedSocket;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn registry(connector: &Arc<MockConnector>) -> SessionRegistry {
    SessionRegistry::new(connector.clone(), PerOrigin::default(), PerOrigin::Value(Vec::new()))
}

#[tokio::test]
async fn test_concurrent_acquires_share_one_session() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let leases: Vec<_> = (0..4).map(|_| sessions.acquire_session(&o, None)).collect();
    assert_eq!(connector.open_count(), 1);
    assert!(leases[0].created_here());
    assert!(leases[1..].iter().all(|l| !l.created_here()));

    let first = leases[0].session().await.unwrap();
    for lease in &leases[1..] {
        assert!(lease.session().await.unwrap().same(&first));
    }
    assert_eq!(first.ref_count(), 4);

    drop(leases);
    assert_eq!(first.ref_count(), 0);
    assert_eq!(connector.session(0).control.keep_alive_log(), vec![false]);
    assert!(sessions.has_origin(&o));
}

#[tokio::test]
async fn test_idle_session_revived_on_join() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let lease = sessions.acquire_session(&o, None);
    let handle = lease.session().await.unwrap();
    lease.release();
    lease.release();
    assert!(lease.is_released());
    assert_eq!(handle.ref_count(), 0);

    let again = sessions.acquire_session(&o, None);
    assert!(!again.created_here());
    assert!(again.session().await.unwrap().same(&handle));
    assert_eq!(handle.ref_count(), 1);

    drop(lease);
    drop(again);
    assert_eq!(connector.open_count(), 1);
    assert_eq!(connector.session(0).control.keep_alive_log(), vec![false, true, false]);
}

#[tokio::test]
async fn test_goaway_moves_session_to_stale() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let lease = sessions.acquire_session(&o, None);
    let handle = lease.session().await.unwrap();
    connector
        .session(0)
        .events
        .send(SessionEvent::GoAway { error_code: 0, last_stream_id: 1 })
        .unwrap();

    eventually(|| !sessions.has_origin(&o)).await;
    assert_eq!(sessions.stale_count(&o), 1);
    assert!(handle.has_gone_away());
    assert!(!handle.is_destroyed());

    // The next caller gets a fresh session
    let next = sessions.acquire_session(&o, None);
    assert!(next.created_here());
    assert!(!next.session().await.unwrap().same(&handle));
    assert_eq!(connector.open_count(), 2);

    sessions.drain_stale(&o).await;
    assert_eq!(sessions.stale_count(&o), 0);
    assert!(handle.is_destroyed());
    assert!(!connector.session(1).control.is_destroyed());
}

#[tokio::test]
async fn test_force_stale() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    // Nothing to move
    sessions.force_stale(&o);
    assert_eq!(sessions.stale_count(&o), 0);

    let lease = sessions.acquire_session(&o, None);
    lease.session().await.unwrap();
    sessions.force_stale(&o);
    assert!(!sessions.has_origin(&o));
    assert_eq!(sessions.stale_count(&o), 1);
    assert!(sessions.active_handle(&o).is_none());
}

#[tokio::test]
async fn test_retire_only_moves_the_active_session() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let old = sessions.acquire_session(&o, None).session().await.unwrap();
    sessions.retire(&old);
    let new = sessions.acquire_session(&o, None).session().await.unwrap();

    // Retiring an already stale session leaves the new one alone
    sessions.retire(&old);
    assert!(sessions.active_handle(&o).unwrap().same(&new));
    assert_eq!(sessions.stale_count(&o), 1);
    assert!(old.has_gone_away());
    assert!(!new.has_gone_away());
}

#[tokio::test]
async fn test_close_specific_handle() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let stale = sessions.acquire_session(&o, None).session().await.unwrap();
    sessions.force_stale(&o);
    let active = sessions.acquire_session(&o, None).session().await.unwrap();

    sessions.close_specific(&o, Some(&stale)).await;
    assert!(stale.is_destroyed());
    assert!(!active.is_destroyed());
    assert_eq!(sessions.stale_count(&o), 0);
    assert!(sessions.has_origin(&o));

    sessions.close_specific(&o, Some(&active)).await;
    assert!(active.is_destroyed());
    assert!(!sessions.has_origin(&o));
}

#[tokio::test]
async fn test_close_specific_origin() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let a = origin("https://a.example");
    let b = origin("https://b.example");

    let stale = sessions.acquire_session(&a, None).session().await.unwrap();
    sessions.force_stale(&a);
    let active = sessions.acquire_session(&a, None).session().await.unwrap();
    let other = sessions.acquire_session(&b, None).session().await.unwrap();

    sessions.close_specific(&a, None).await;
    assert!(stale.is_destroyed());
    assert!(active.is_destroyed());
    assert!(!other.is_destroyed());
    assert_eq!(sessions.active_origins(), vec![b.clone()]);
    assert_eq!(sessions.stale_count(&a), 0);
}

#[tokio::test]
async fn test_close_waits_for_transport_shutdown() {
    let connector = MockConnector::deferred_close();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    sessions.acquire_session(&o, None).session().await.unwrap();
    sessions.force_stale(&o);
    sessions.acquire_session(&o, None).session().await.unwrap();
    let (stale, active) = (connector.session(0).control, connector.session(1).control);

    let closing = tokio::spawn({
        let sessions = sessions.clone();
        let o = o.clone();
        async move { sessions.close_specific(&o, None).await }
    });
    eventually(|| stale.is_destroyed() && active.is_destroyed()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!closing.is_finished());

    stale.finish_close();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!closing.is_finished());

    active.finish_close();
    closing.await.unwrap();
    assert!(!sessions.has_origin(&o));
    assert_eq!(sessions.stale_count(&o), 0);
}

#[tokio::test]
async fn test_drain_stale_waits_for_transport_shutdown() {
    let connector = MockConnector::deferred_close();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    sessions.acquire_session(&o, None).session().await.unwrap();
    sessions.force_stale(&o);
    let stale = connector.session(0).control;

    let draining = tokio::spawn({
        let sessions = sessions.clone();
        let o = o.clone();
        async move { sessions.drain_stale(&o).await }
    });
    eventually(|| stale.is_destroyed()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!draining.is_finished());

    stale.finish_close();
    draining.await.unwrap();
    assert!(stale.is_closed());
}

#[test]
#[should_panic]
fn test_acquire_requires_runtime() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    sessions.acquire_session(&origin("https://example.com"), None);
}

#[tokio::test]
async fn test_close_all() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let a = origin("https://a.example");
    let b = origin("http://b.example:8080");

    let first = sessions.acquire_session(&a, None).session().await.unwrap();
    sessions.force_stale(&a);
    sessions.acquire_session(&a, None).session().await.unwrap();
    sessions.acquire_session(&b, None).session().await.unwrap();
    assert_eq!(sessions.active_origins(), vec![a.clone(), b.clone()]);

    sessions.close_all().await;
    assert!(sessions.active_origins().is_empty());
    assert_eq!(sessions.stale_count(&a), 0);
    assert!(first.is_destroyed());
    assert!((0..3).all(|i| connector.session(i).control.is_destroyed()));
}

#[tokio::test]
async fn test_connect_failures_reject_after_removal() {
    let cases = [
        (Script::Timeout, NetError::ConnectionTimedOut),
        (Script::Fail(NetError::ConnectionRefused), NetError::ConnectionRefused),
        (Script::CloseBeforeConnect, NetError::ConnectionClosed),
    ];

    for (script, expected) in cases {
        let connector = MockConnector::new();
        connector.script(script);
        let sessions = registry(&connector);
        let o = origin("https://example.com");

        let lease = sessions.acquire_session(&o, None);
        let joined = sessions.acquire_session(&o, None);
        assert_eq!(lease.session().await.unwrap_err(), expected);
        assert_eq!(joined.session().await.unwrap_err(), expected);
        assert!(!sessions.has_origin(&o));
        assert!(connector.session(0).control.is_destroyed());
    }
}

#[tokio::test]
async fn test_getter_retries_failed_join_once() {
    let connector = MockConnector::new();
    connector.script(Script::Manual);
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    let creator = sessions.acquire_session(&o, None);
    let getter = Http2SessionGetter::new(sessions.clone(), o.clone(), None);
    let joined = tokio::spawn(async move { getter.get().await.map(|(_, handle)| handle) });

    eventually(|| creator.handle().ref_count() == 2).await;
    connector.session(0).events.send(SessionEvent::Error(NetError::ConnectionReset)).unwrap();

    assert_eq!(creator.session().await.unwrap_err(), NetError::ConnectionReset);
    let handle = joined.await.unwrap().unwrap();
    assert_eq!(connector.open_count(), 2);
    assert!(sessions.active_handle(&o).unwrap().same(&handle));
}

#[tokio::test]
async fn test_getter_creator_failure_is_final() {
    let connector = MockConnector::new();
    connector.script(Script::Fail(NetError::ConnectionRefused));
    let sessions = registry(&connector);

    let getter = Http2SessionGetter::new(sessions, origin("https://example.com"), None);
    assert_eq!(getter.get().await.unwrap_err(), NetError::ConnectionRefused);
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test]
async fn test_session_options_merged() {
    let connector = MockConnector::new();
    let base = SessionOptions { connect_timeout: Some(Duration::from_secs(5)), ..Default::default() };
    let sessions =
        SessionRegistry::new(connector.clone(), PerOrigin::Value(base), PerOrigin::Value(Vec::new()));

    let (socket, _peer) = tokio::io::duplex(64);
    let extra = SessionOptions::with_transport(BoxedSocket::new(socket));
    let lease = sessions.acquire_session(&origin("https://example.com"), Some(&extra));
    lease.session().await.unwrap();

    let opened = connector.session(0);
    assert_eq!(opened.connect_timeout, Some(Duration::from_secs(5)));
    assert!(opened.took_transport);
}

#[tokio::test]
async fn test_close_event_forgets_session() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let o = origin("https://example.com");

    sessions.acquire_session(&o, None).session().await.unwrap();
    connector.session(0).events.send(SessionEvent::Close).unwrap();
    eventually(|| !sessions.has_origin(&o)).await;
    assert_eq!(sessions.stale_count(&o), 0);
}

#[tokio::test]
async fn test_dropped_registry_destroys_session() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    let handle = lease.session().await.unwrap();

    drop(sessions);
    connector
        .session(0)
        .events
        .send(SessionEvent::GoAway { error_code: 0, last_stream_id: 0 })
        .unwrap();
    eventually(|| handle.is_destroyed()).await;
}

fn pushed(path: &str) -> (PushedStream, tokio::sync::mpsc::UnboundedSender<PushEvent>) {
    PushedStream::new(vec![
        (":method".to_string(), "GET".to_string()),
        (":path".to_string(), path.to_string()),
        ("accept".to_string(), "text/css".to_string()),
    ])
}

type Received = Arc<Mutex<Vec<(PushedRequest, PushedResponse)>>>;

fn collect_pushes(sessions: &SessionRegistry) -> Received {
    let received: Received = Arc::default();
    let sink = received.clone();
    sessions.set_push_handler(Some(Arc::new(move |_origin, request, response| {
        sink.lock().unwrap().push((request, response));
    })));
    received
}

#[tokio::test]
async fn test_push_without_handler_is_dropped() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    let handle = lease.session().await.unwrap();

    let (stream, tx) = pushed("/style.css");
    connector.session(0).events.send(SessionEvent::Push(stream)).unwrap();
    eventually(|| tx.is_closed()).await;
    assert_eq!(handle.ref_count(), 1);
}

#[tokio::test]
async fn test_push_delivered_to_handler() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let received = collect_pushes(&sessions);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    let handle = lease.session().await.unwrap();

    let (stream, tx) = pushed("/style.css");
    connector.session(0).events.send(SessionEvent::Push(stream)).unwrap();
    eventually(|| received.lock().unwrap().len() == 1).await;
    assert_eq!(handle.ref_count(), 2);

    let (request, response) = received.lock().unwrap().pop().unwrap();
    assert_eq!(request.path, "/style.css");
    assert_eq!(request.url.as_str(), "https://example.com/style.css");
    assert_eq!(request.headers["accept"], "text/css");
    assert!(!request.headers.contains_key(":method"));

    let pushed = http::Response::builder()
        .status(200)
        .body(ResponseBody::from("body { }"))
        .unwrap();
    tx.send(PushEvent::Response(pushed)).unwrap();
    tx.send(PushEvent::Close).unwrap();

    let response = response.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "body { }");
    eventually(|| handle.ref_count() == 1).await;
}

#[tokio::test]
async fn test_push_closed_without_headers() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let received = collect_pushes(&sessions);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    let handle = lease.session().await.unwrap();

    let (stream, tx) = pushed("/late.js");
    connector.session(0).events.send(SessionEvent::Push(stream)).unwrap();
    eventually(|| received.lock().unwrap().len() == 1).await;
    tx.send(PushEvent::Close).unwrap();

    let (_, response) = received.lock().unwrap().pop().unwrap();
    assert_eq!(response.await.unwrap_err(), NetError::Http2PushedStreamNotAvailable);
    eventually(|| handle.ref_count() == 1).await;
}

#[tokio::test]
async fn test_push_abort_rejects() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let received = collect_pushes(&sessions);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    lease.session().await.unwrap();

    let (stream, tx) = pushed("/a.js");
    connector.session(0).events.send(SessionEvent::Push(stream)).unwrap();
    eventually(|| received.lock().unwrap().len() == 1).await;
    tx.send(PushEvent::Aborted).unwrap();
    // A second outcome after the first is only traced
    tx.send(PushEvent::FrameError).unwrap();
    tx.send(PushEvent::Close).unwrap();

    let (_, response) = received.lock().unwrap().pop().unwrap();
    assert_eq!(response.await.unwrap_err(), NetError::Aborted);
}

#[tokio::test]
async fn test_cleared_push_handler() {
    let connector = MockConnector::new();
    let sessions = registry(&connector);
    let received = collect_pushes(&sessions);
    sessions.set_push_handler(None);
    let lease = sessions.acquire_session(&origin("https://example.com"), None);
    lease.session().await.unwrap();

    let (stream, tx) = pushed("/x");
    connector.session(0).events.send(SessionEvent::Push(stream)).unwrap();
    eventually(|| tx.is_closed()).await;
    assert!(received.lock().unwrap().is_empty());
}
