//! The single capability surface every backend implements: publish/
//! subscribe, request/reply, lifecycle, and liveness. The service never
//! sees backend-specific types — it holds an `Arc<dyn Transport>`.
//!
//! Each backend here owns routing, framing, and group/partition bookkeeping
//! only; the actual socket, broker, or HTTP/TLS client is a host-supplied
//! driver trait (`BusDriver`, `LogDriver`, `GatewayHttpClient`).

mod shared;

pub mod bus;
pub mod gateway;
pub mod log_backend;
pub mod mock;

pub use shared::CloseState;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport request to {route} timed out after {timeout:?}")]
    Timeout { route: String, timeout: Duration },
    #[error("transport is closed")]
    Closed,
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("transport driver failure: {0}")]
    Driver(String),
}

/// Called by a `handle` registration's transport-driven dispatcher to send
/// exactly one reply for the inbound request it received. Calling it more
/// than once is a contract violation left to the driver to detect.
pub type ReplyFn = Box<dyn FnOnce(Bytes) + Send>;

/// Signature for `handle`-registered request/reply callbacks.
pub type HandleFn = Arc<dyn Fn(Bytes, ReplyFn) + Send + Sync>;

/// Signature for `subscribe`-registered fire-and-forget callbacks.
pub type SubscribeFn = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Commits a consumer-group offset once the raw-message handler decides the
/// message is safely processed. Only meaningful for backends that support
/// `subscribe_raw` (the partitioned log backend).
pub type CommitFn = Box<dyn FnOnce() + Send>;
pub type RawSubscribeFn = Arc<dyn Fn(Bytes, CommitFn) + Send + Sync>;

pub type CloseHandler = Box<dyn Fn() + Send + Sync>;
pub type ReadyHook = Box<dyn FnOnce() + Send>;

/// The shared transport contract. `listen` is the only call expected to
/// block; every other method returns as soon as its effect is durable
/// (registered, sent, or replied).
///
/// # Why
/// The service must never know whether it's talking to a message bus, a
/// partitioned log, or an HTTP gateway — each has a wildly different
/// delivery model (queue-group fan-out, consumer-group commit, request/
/// response over TLS) but the service only ever needs publish/subscribe/
/// handle/request/lifecycle. One object-safe trait behind `Arc<dyn
/// Transport>` lets `Service` stay backend-agnostic.
///
/// # How
/// `async_trait` makes the trait object-safe despite async methods. Each
/// backend owns routing, framing, and group/partition bookkeeping; the
/// actual socket, broker, or HTTP client is a separate host-supplied driver
/// trait (`BusDriver`, `LogDriver`, `GatewayHttpClient`) the backend wraps.
///
/// # Contract
/// - `close` is idempotent; calling it twice must not error or double-fire
///   `on_close`.
/// - A backend that cannot support an optional capability (`subscribe_raw`)
///   returns `TransportError::Unsupported` rather than panicking.
///
/// # Trade-offs
/// Routing every backend through one trait means backend-specific
/// optimizations (e.g. the log backend's partition selection) have to be
/// expressed as ordinary parameters or config, not extra trait methods,
/// since adding a method means adding it to every other backend too.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Block until closed, calling `on_ready` once traffic can flow.
    /// Implementations also arrange for SIGINT/SIGTERM to trigger `close`.
    async fn listen(&self, on_ready: ReadyHook) -> Result<(), TransportError>;

    async fn publish(&self, route: &str, bytes: Bytes) -> Result<(), TransportError>;

    /// At-most-once delivery per `group`: one subscriber per group receives
    /// each message; every distinct group receives its own copy.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: SubscribeFn,
    ) -> Result<(), TransportError>;

    /// Like [`Transport::subscribe`] but hands the handler the raw transport
    /// message plus an explicit commit callback, for backends where
    /// acknowledgement is the caller's responsibility. Unsupported by
    /// default; backends opt in.
    async fn subscribe_raw(
        &self,
        _topic: &str,
        _group: &str,
        _handler: RawSubscribeFn,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("subscribe_raw"))
    }

    async fn handle(&self, route: &str, group: &str, handler: HandleFn) -> Result<(), TransportError>;

    async fn request(&self, route: &str, bytes: Bytes, timeout: Duration) -> Result<Bytes, TransportError>;

    /// Idempotent.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Install a callback invoked on loss of connectivity, planned or not.
    fn on_close(&self, handler: CloseHandler);
}
