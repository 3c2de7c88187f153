#![allow(dead_code)]

//! Shared utilities for listener integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use ws_listener::{ConnectionId, Listener, ListenerConfig};

/// Handler invocations observed during a test.
#[derive(Default)]
pub struct Recorder {
    pub opened: Mutex<Vec<(String, ConnectionId)>>,
    pub closed: Mutex<Vec<(String, ConnectionId)>>,
}

impl Recorder {
    pub fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.lock().unwrap().len()
    }

    pub fn last_opened_id(&self) -> Option<ConnectionId> {
        self.opened.lock().unwrap().last().map(|(_, id)| id.clone())
    }
}

/// Build an ephemeral-port listener whose open/close handlers record into
/// the returned [`Recorder`].
pub fn recording_listener(secure: bool, config: ListenerConfig) -> (Listener, Arc<Recorder>) {
    let mut listener = Listener::new(secure, 0, config);
    let recorder = Arc::new(Recorder::default());

    let opened = recorder.clone();
    listener
        .set_open_handler(move |path, id| {
            opened
                .opened
                .lock()
                .unwrap()
                .push((path.to_string(), id.clone()));
        })
        .unwrap();

    let closed = recorder.clone();
    listener
        .set_close_handler(move |path, id| {
            closed
                .closed
                .lock()
                .unwrap()
                .push((path.to_string(), id.clone()));
        })
        .unwrap();

    (listener, recorder)
}

/// Connect a plaintext WebSocket client to the local listener.
pub async fn connect(port: u16, path: &str) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let (stream, _response) = connect_async(format!("ws://127.0.0.1:{port}{path}"))
        .await
        .expect("client handshake");
    stream
}

/// Poll `condition` until it holds or a deadline passes.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within deadline");
}
