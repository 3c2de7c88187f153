//! Integration tests for the listener lifecycle, acceptance policy,
//! identity addressing, and send semantics.

use std::collections::BTreeMap;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use ws_listener::{
    ConnectionId, Listener, ListenerConfig, ListenerError, ListenerGuard, ListenerState, Message,
    SendError,
};

mod common;

/// Drain a client until its stream ends, acknowledging the server's close
/// handshake along the way.
fn drain_client<S>(mut client: S) -> JoinHandle<()>
where
    S: Stream + Unpin + Send + 'static,
{
    tokio::spawn(async move { while client.next().await.is_some() {} })
}

#[tokio::test]
async fn open_reports_bound_port() {
    let (mut listener, _recorder) = common::recording_listener(false, ListenerConfig::default());
    assert_eq!(listener.state(), ListenerState::Created);

    listener.open().await.expect("open");
    assert_eq!(listener.state(), ListenerState::Open);
    assert_ne!(listener.port(), 0, "wildcard port resolved on open");

    listener.close().await.expect("close");
    assert_eq!(listener.state(), ListenerState::Closed);
}

#[tokio::test]
async fn open_on_occupied_port_fails() {
    let occupied = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut listener = Listener::new(false, port, ListenerConfig::default());
    let err = listener.open().await.expect_err("port is occupied");
    assert!(matches!(err, ListenerError::Bind(_)));
    assert_eq!(listener.state(), ListenerState::Closed);

    // a failed open is terminal: the instance is not reusable
    assert!(matches!(
        listener.open().await,
        Err(ListenerError::InvalidState(_))
    ));
}

#[tokio::test]
async fn double_open_is_rejected() {
    let (mut listener, _recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();
    assert!(matches!(
        listener.open().await,
        Err(ListenerError::InvalidState(ListenerState::Open))
    ));
    listener.close().await.unwrap();

    // close is tolerated again once closed
    listener.close().await.expect("idempotent close");
}

#[tokio::test]
async fn validate_handler_gates_acceptance() {
    let (mut listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.set_validate_handler(|path| path == "/ok").unwrap();
    listener.open().await.unwrap();
    let port = listener.port();

    let mut accepted = common::connect(port, "/ok").await;
    common::wait_for(|| recorder.opened_count() == 1).await;
    assert_eq!(recorder.opened.lock().unwrap()[0].0, "/ok");

    let refused =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/nope")).await;
    assert!(refused.is_err(), "handshake for /nope is rejected");

    // the accepted connection is addressable through its identity
    let id = recorder.last_opened_id().unwrap();
    listener.send(&id, Message::from("hi")).await.expect("send");
    let frame = accepted.next().await.expect("frame").expect("frame ok");
    assert_eq!(frame, Message::from("hi"));

    let reader = drain_client(accepted);
    listener.close().await.unwrap();
    assert_eq!(recorder.opened_count(), 1, "no handler fired for /nope");
    assert_eq!(recorder.closed_count(), 1);
    assert_eq!(recorder.closed.lock().unwrap()[0].0, "/ok");
    reader.await.unwrap();
}

#[tokio::test]
async fn sends_to_one_connection_arrive_in_order() {
    let (mut listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();

    let mut client = common::connect(listener.port(), "/stream").await;
    common::wait_for(|| recorder.opened_count() == 1).await;
    let id = recorder.last_opened_id().unwrap();

    listener.send(&id, Message::from("m1")).await.unwrap();
    listener.send(&id, Message::from("m2")).await.unwrap();
    listener.send(&id, Message::from("m3")).await.unwrap();

    for expected in ["m1", "m2", "m3"] {
        let frame = client.next().await.expect("frame").expect("frame ok");
        assert_eq!(frame, Message::from(expected));
    }

    drop(client);
    listener.close().await.unwrap();
}

#[tokio::test]
async fn send_to_unknown_identity_fails() {
    let (mut listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();

    // the null identity never names a connection
    let err = listener
        .send(&ConnectionId::default(), Message::from("hi"))
        .await
        .expect_err("null identity");
    assert!(matches!(err, SendError::ConnectionNotFound));

    let client = common::connect(listener.port(), "/gone").await;
    common::wait_for(|| recorder.opened_count() == 1).await;
    let id = recorder.last_opened_id().unwrap();

    drop(client);
    common::wait_for(|| recorder.closed_count() == 1).await;

    // the close handler has fired; the identity no longer resolves
    let err = listener
        .send(&id, Message::from("late"))
        .await
        .expect_err("connection is gone");
    assert!(matches!(err, SendError::ConnectionNotFound));

    listener.close().await.unwrap();
}

#[tokio::test]
async fn close_terminates_every_open_connection() {
    let (mut listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();
    let port = listener.port();

    let mut readers = Vec::new();
    for i in 0..3 {
        let client = common::connect(port, &format!("/client{i}")).await;
        readers.push(drain_client(client));
    }
    common::wait_for(|| recorder.opened_count() == 3).await;

    listener.close().await.unwrap();
    assert_eq!(
        recorder.closed_count(),
        3,
        "every close handler fired before close resolved"
    );

    // each client observed the server-initiated close and ran dry
    for reader in readers {
        reader.await.unwrap();
    }

    // and nothing new is accepted afterwards
    let refused = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/late")).await;
    assert!(refused.is_err());
    assert_eq!(recorder.opened_count(), 3);
}

#[tokio::test]
async fn handler_registration_rejected_after_open() {
    let (mut listener, _recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();

    let err = listener
        .set_validate_handler(|_| true)
        .expect_err("post-open registration");
    assert!(matches!(
        err,
        ListenerError::InvalidState(ListenerState::Open)
    ));

    listener.close().await.unwrap();
}

#[tokio::test]
async fn identities_of_distinct_connections_are_ordered() {
    let (mut listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    listener.open().await.unwrap();
    let port = listener.port();

    let first = common::connect(port, "/a").await;
    let second = common::connect(port, "/b").await;
    common::wait_for(|| recorder.opened_count() == 2).await;

    let (a, b) = {
        let opened = recorder.opened.lock().unwrap();
        (opened[0].1.clone(), opened[1].1.clone())
    };
    assert_ne!(a, b);
    assert!((a < b) ^ (b < a), "strictly ordered");
    assert!(ConnectionId::default() < a);
    assert!(ConnectionId::default() < b);

    let mut by_id = BTreeMap::new();
    by_id.insert(a.clone(), "first");
    by_id.insert(b.clone(), "second");
    assert_eq!(by_id.get(&a), Some(&"first"));
    assert_eq!(by_id.get(&b), Some(&"second"));

    drop(first);
    drop(second);
    listener.close().await.unwrap();

    // the ordering stays defined after both connections are gone
    assert!((a < b) ^ (b < a));
    assert_ne!(a, b);
}

#[tokio::test]
async fn guard_opens_and_closes_listener() {
    let (listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    let guard = ListenerGuard::open(listener).await.expect("guard open");

    let client = common::connect(guard.port(), "/guarded").await;
    common::wait_for(|| recorder.opened_count() == 1).await;

    let reader = drain_client(client);
    guard.close().await.expect("guard close");
    assert_eq!(recorder.closed_count(), 1);
    reader.await.unwrap();
}

#[tokio::test]
async fn guard_drop_closes_listener() {
    let (listener, recorder) = common::recording_listener(false, ListenerConfig::default());
    let guard = ListenerGuard::open(listener).await.unwrap();
    let port = guard.port();

    let client = common::connect(port, "/scoped").await;
    common::wait_for(|| recorder.opened_count() == 1).await;

    let reader = drain_client(client);
    drop(guard);
    common::wait_for(|| recorder.closed_count() == 1).await;
    reader.await.unwrap();

    let refused = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/late")).await;
    assert!(refused.is_err(), "socket released after guard teardown");
}

#[tokio::test]
async fn guard_propagates_open_failure() {
    let occupied = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let listener = Listener::new(false, port, ListenerConfig::default());
    assert!(ListenerGuard::open(listener).await.is_err());
}
