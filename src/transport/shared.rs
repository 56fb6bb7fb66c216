//! Lifecycle bookkeeping common to every backend: open/closed state, the
//! close-handler list, and the SIGINT/SIGTERM wiring `listen` needs. Backends
//! hold one of these and delegate rather than reimplementing it four times.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{CloseHandler, ReadyHook, TransportError};

pub struct CloseState {
    open: AtomicBool,
    notify: Notify,
    handlers: Mutex<Vec<CloseHandler>>,
}

impl Default for CloseState {
    fn default() -> Self {
        Self::new()
    }
}

impl CloseState {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            notify: Notify::new(),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn on_close(&self, handler: CloseHandler) {
        self.handlers.lock().push(handler);
    }

    /// Idempotent: only the first call runs the registered handlers.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.notify.notify_waiters();
            for handler in self.handlers.lock().iter() {
                handler();
            }
        }
    }

    pub async fn wait_closed(&self) {
        while self.is_open() {
            self.notify.notified().await;
        }
    }
}

/// Fire `on_ready`, then block until either explicit close or a shutdown
/// signal, closing `state` in the latter case before returning.
pub async fn listen_until_closed(
    state: &CloseState,
    on_ready: ReadyHook,
) -> Result<(), TransportError> {
    on_ready();
    tokio::select! {
        _ = state.wait_closed() => {}
        _ = shutdown_signal() => {
            tracing::info!("received shutdown signal, closing transport");
            state.close();
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// The canonical in-memory separator is `/`; backends translate to their
/// own preferred wire separator at the edge.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent_and_runs_handlers_once() {
        let state = CloseState::new();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = std::sync::Arc::clone(&count);
        state.on_close(Box::new(move || {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        state.close();
        state.close();

        assert!(!state.is_open());
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn split_path_drops_empty_segments() {
        assert_eq!(split_path("/math/sum"), vec!["math", "sum"]);
        assert_eq!(split_path("x"), vec!["x"]);
    }
}
