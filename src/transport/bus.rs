//! Queue-group message bus backend (e.g. NATS-shaped). Dot-separated wire
//! routes; `handle` is a queue subscription the broker load-balances across
//! instances sharing a group; `request` is a single correlated send with
//! timeout. The actual socket/broker protocol lives behind [`BusDriver`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::shared::{listen_until_closed, CloseState};
use super::{CloseHandler, HandleFn, ReadyHook, SubscribeFn, Transport, TransportError};

/// Driver surface a host implements against a real bus client library.
/// This crate never speaks the wire protocol itself; it only translates
/// routes and wires up queue-group fan-out around these calls.
///
/// # Why
/// The broker's wire protocol (NATS, or anything shaped like it) is exactly
/// the kind of thing this crate explicitly keeps out of scope — a host
/// already has a client library for it. `BusDriver` is the seam: this crate
/// owns route naming and queue-group semantics, the host owns sockets.
///
/// # Contract
/// - `queue_subscribe`'s `handler` must eventually call its reply callback
///   at most once per inbound message; the driver is responsible for
///   routing that call back through whatever correlation the broker uses.
/// - `is_connected` is a point-in-time liveness check, not a guarantee the
///   next `request` will succeed.
#[async_trait]
pub trait BusDriver: Send + Sync + 'static {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Register a queue subscription. The driver is responsible for
    /// invoking `handler`'s reply callback through whatever correlation
    /// mechanism the broker provides (e.g. NATS reply-to subjects).
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: HandleFn,
    ) -> Result<(), TransportError>;

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, TransportError>;

    fn is_connected(&self) -> bool;
}

const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(200);
const CONNECTION_POLL_PERIOD: Duration = Duration::from_secs(1);

pub struct BusTransport {
    driver: Arc<dyn BusDriver>,
    close: Arc<CloseState>,
}

impl BusTransport {
    pub fn new(driver: Arc<dyn BusDriver>) -> Self {
        Self {
            driver,
            close: Arc::new(CloseState::new()),
        }
    }
}

fn to_wire_subject(route: &str) -> String {
    super::shared::split_path(route).join(".")
}

#[async_trait]
impl Transport for BusTransport {
    async fn listen(&self, on_ready: ReadyHook) -> Result<(), TransportError> {
        let driver = Arc::clone(&self.driver);
        let close = Arc::clone(&self.close);
        tokio::spawn(watch_connection(driver, close));
        listen_until_closed(&self.close, on_ready).await
    }

    async fn publish(&self, route: &str, bytes: Bytes) -> Result<(), TransportError> {
        self.driver.publish(&to_wire_subject(route), bytes).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: SubscribeFn,
    ) -> Result<(), TransportError> {
        let wrapped: HandleFn = Arc::new(move |bytes, _reply| handler(bytes));
        self.driver
            .queue_subscribe(&to_wire_subject(topic), group, wrapped)
            .await
    }

    async fn handle(&self, route: &str, group: &str, handler: HandleFn) -> Result<(), TransportError> {
        self.driver
            .queue_subscribe(&to_wire_subject(route), group, handler)
            .await
    }

    async fn request(&self, route: &str, bytes: Bytes, timeout: Duration) -> Result<Bytes, TransportError> {
        self.driver.request(&to_wire_subject(route), bytes, timeout).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.close.is_open()
    }

    fn on_close(&self, handler: CloseHandler) {
        self.close.on_close(handler);
    }
}

/// Polls `driver.is_connected()` on a bounded retry schedule; a streak of
/// `RECONNECT_ATTEMPTS` failures closes the transport so `onClose` fires
/// instead of the service hanging on a dead connection forever.
async fn watch_connection(driver: Arc<dyn BusDriver>, close: Arc<CloseState>) {
    let mut attempt = 0u32;
    loop {
        tokio::time::sleep(CONNECTION_POLL_PERIOD).await;
        if !close.is_open() {
            return;
        }
        if driver.is_connected() {
            attempt = 0;
            continue;
        }
        attempt += 1;
        tracing::warn!(attempt, "bus driver reports disconnected");
        if attempt > RECONNECT_ATTEMPTS {
            tracing::error!("bus driver exceeded reconnect attempts, closing transport");
            close.close();
            return;
        }
        tokio::time::sleep(RECONNECT_BASE_DELAY * attempt).await;
    }
}
