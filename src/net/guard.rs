//! Scoped open/close guard for a listener.

use std::ops::Deref;

use crate::net::listener::{Listener, ListenerError};

/// Opens a [`Listener`] on construction and guarantees it is closed again
/// on every exit path.
///
/// Prefer [`ListenerGuard::close`] when the enclosing scope ends normally,
/// to await the close and observe its outcome. `Drop` covers every other
/// exit: it spawns the close onto the current runtime and only logs
/// failures, so teardown never panics.
pub struct ListenerGuard {
    listener: Option<Listener>,
}

impl ListenerGuard {
    /// Open `listener`; a failed `open()` fails construction.
    pub async fn open(mut listener: Listener) -> Result<Self, ListenerError> {
        listener.open().await?;
        Ok(Self {
            listener: Some(listener),
        })
    }

    /// Close the held listener and wait for it to quiesce.
    pub async fn close(mut self) -> Result<(), ListenerError> {
        match self.listener.take() {
            Some(mut listener) => listener.close().await,
            None => Ok(()),
        }
    }
}

impl Deref for ListenerGuard {
    type Target = Listener;

    fn deref(&self) -> &Listener {
        // only `close` takes the listener, and it consumes the guard
        self.listener.as_ref().expect("listener present until guard is consumed")
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = listener.close().await {
                        tracing::warn!("listener close during guard teardown failed: {e}");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("no runtime available to close listener during guard teardown");
            }
        }
    }
}
