//! The composition root: wires codec, transport, logger, health registry,
//! worker pool, and an optional service registry into the single entry
//! point applications construct. Registration (`handle`/`on`/
//! `register_health_check`) happens through `&mut self` during setup;
//! `listen`/`close` take `&self` so a caller can hold the service behind an
//! `Arc`, run `listen` on one task, and call `close` from another.

mod path;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::codec::{Codec, CodecError, JsonCodec};
use crate::config::ServiceConfig;
use crate::error::{codes, StructuredError};
use crate::health::{CheckStatus, DependencyProbe, HealthRegistry, HEALTHCHECK_ROUTE};
use crate::logger::{Level, Logger};
use crate::registry::{Registry, RegistryError};
use crate::request::Request;
use crate::response::Response;
use crate::transport::mock::MockTransport;
use crate::transport::{HandleFn, RawSubscribeFn, ReadyHook, SubscribeFn, Transport, TransportError};
use crate::worker_pool::WorkerPool;

/// A registered request/reply callback. Runs on the worker pool once its
/// inbound `Request` has been decoded.
pub type HandlerFn = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub enum LogPolicy {
    Default,
    Off,
    Level(Level),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("registry registration failed: {0}")]
    Registry(#[from] RegistryError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),
}

struct HandlerRegistration {
    resolved: path::ResolvedPath,
    handler: HandlerFn,
    log_policy: LogPolicy,
}

struct SubscriptionRegistration {
    topic: String,
    handler: SubscribeFn,
}

#[derive(Serialize)]
struct HealthPayload<'a> {
    summary: &'a str,
}

/// A long-lived SDK instance: `name@id` identifies it uniquely. Construct
/// with [`Service::new`], register handlers/subscriptions/probes, then call
/// [`Service::listen`] exactly once.
///
/// # Why
/// Everything a service needs — transport, codec, logger, health registry,
/// registry client, worker pool — has to be wired together exactly once and
/// then used from however many tasks the host spawns. Splitting the API
/// into a setup phase and a running phase avoids both a giant constructor
/// and a `Mutex` around every field.
///
/// # How
/// Setup methods (`set_*`, `handle`, `on`, `register_health_check`,
/// `on_close`) take `&mut self` and return `&mut Self` for chaining; they
/// run before the service is wrapped in `Arc`. Running methods (`listen`,
/// `close`, `call`, `emit`, `subscribe_for_raw_msg`) take `&self` and are
/// safe to call concurrently once wrapped — the only interior mutability
/// left at that point is the health registry's close-signal sender and the
/// probe list, both behind `parking_lot::Mutex`.
///
/// # Contract
/// - `listen` may be called at most once; a second call panics rather than
///   silently re-registering handlers.
/// - Registration methods called after `listen` has started have no effect
///   on the already-installed transport handlers.
///
/// # Trade-offs
/// The `&mut self`/`&self` split pushes a compile-time error onto callers
/// who try to register a handler after wrapping in `Arc`, which is the
/// intended guardrail, but it does mean setup and running code can't share
/// a single generic helper that needs both kinds of access.
pub struct Service<C: Codec + Clone = JsonCodec> {
    name: String,
    #[allow(dead_code)]
    id: Uuid,
    instance_name: String,
    codec: C,
    transport: Arc<dyn Transport>,
    logger: Logger,
    registry: Option<Arc<dyn Registry>>,
    config: ServiceConfig,
    worker_pool: WorkerPool,
    health: Mutex<HealthRegistry>,
    health_close_tx: Mutex<Option<mpsc::Sender<()>>>,
    handlers: Vec<HandlerRegistration>,
    subscriptions: Vec<SubscriptionRegistration>,
    prefixes: BTreeSet<String>,
    started: AtomicBool,
}

impl Service<JsonCodec> {
    /// Construct with the JSON reference codec, a fresh id, an in-memory
    /// transport (swap it via [`Service::set_transport`] for a real
    /// backend), and configuration read from the environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_codec(name, JsonCodec)
    }
}

impl<C: Codec + Clone> Service<C> {
    pub fn with_codec(name: impl Into<String>, codec: C) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        let instance_name = format!("{name}@{id}");
        let config = ServiceConfig::from_env();
        let worker_pool = WorkerPool::new(config.threadpool_size);
        Self {
            name,
            id,
            instance_name,
            codec,
            transport: Arc::new(MockTransport::new()),
            logger: Logger::from_env(),
            registry: None,
            config,
            worker_pool,
            health: Mutex::new(HealthRegistry::new()),
            health_close_tx: Mutex::new(None),
            handlers: Vec::new(),
            subscriptions: Vec::new(),
            prefixes: BTreeSet::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    // ---- setup phase: &mut self -----------------------------------------

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = transport;
        self
    }

    pub fn set_logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    pub fn set_registry(&mut self, registry: Arc<dyn Registry>) -> &mut Self {
        self.registry = Some(registry);
        self
    }

    pub fn set_config(&mut self, config: ServiceConfig) -> &mut Self {
        self.worker_pool = WorkerPool::new(config.threadpool_size);
        self.config = config;
        self
    }

    /// Install a callback invoked when the transport loses connectivity.
    /// Call this after [`Service::set_transport`] — it is wired directly
    /// into whichever transport instance is current at call time.
    pub fn on_close(&mut self, hook: crate::transport::CloseHandler) -> &mut Self {
        self.transport.on_close(hook);
        self
    }

    pub fn register_health_check(&mut self, probe: DependencyProbe) -> &mut Self {
        self.health.get_mut().register(probe);
        self
    }

    pub fn handle(&mut self, path: impl Into<String>, handler: HandlerFn) -> &mut Self {
        self.handle_with_policy(path, handler, LogPolicy::Default)
    }

    pub fn handle_silent(&mut self, path: impl Into<String>, handler: HandlerFn) -> &mut Self {
        self.handle_with_policy(path, handler, LogPolicy::Off)
    }

    pub fn handle_with_level(&mut self, path: impl Into<String>, handler: HandlerFn, level: Level) -> &mut Self {
        self.handle_with_policy(path, handler, LogPolicy::Level(level))
    }

    fn handle_with_policy(&mut self, path: impl Into<String>, handler: HandlerFn, log_policy: LogPolicy) -> &mut Self {
        let resolved = path::resolve(&path.into(), &self.name);
        if resolved.group != self.name {
            self.prefixes.insert(resolved.group.clone());
        }
        self.handlers.push(HandlerRegistration {
            resolved,
            handler,
            log_policy,
        });
        self
    }

    pub fn on(&mut self, topic: impl Into<String>, handler: SubscribeFn) -> &mut Self {
        self.subscriptions.push(SubscriptionRegistration {
            topic: topic.into(),
            handler,
        });
        self
    }

    // ---- running phase: &self ---------------------------------------------

    /// 1. Register with the registry (if any) — a failure here is fatal.
    /// 2. Install the status endpoint and start the health loop.
    /// 3. Install every registered handler and subscription.
    /// 4. Block in `transport.listen` until closed.
    pub async fn listen(&self) -> Result<(), ServiceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            panic!("Service::listen called more than once; this is a programmer error");
        }

        if let Some(registry) = &self.registry {
            let prefixes: Vec<String> = self.prefixes.iter().cloned().collect();
            registry.register(&self.name, &self.instance_name, &prefixes).await?;
        }

        if !self.config.health_check_disabled {
            self.health.lock().register(DependencyProbe::new(
                "transport",
                Duration::from_millis(500),
                {
                    let transport = Arc::clone(&self.transport);
                    move || {
                        let transport = Arc::clone(&transport);
                        async move {
                            if transport.is_open() {
                                (CheckStatus::Ok, None)
                            } else {
                                (CheckStatus::Crit, Some("transport is closed".to_string()))
                            }
                        }
                    }
                },
            ));
            self.install_health_check().await?;
            let (_handle, tx) = self.health.lock().spawn_loop();
            *self.health_close_tx.lock() = Some(tx);
        }

        for registration in &self.handlers {
            self.install_handler(registration).await?;
        }
        for subscription in &self.subscriptions {
            let wire_topic = format!("{}:{}", self.name, subscription.topic);
            self.transport
                .subscribe(&wire_topic, &self.name, Arc::clone(&subscription.handler))
                .await?;
        }

        let logger = self.logger.clone();
        let name = self.name.clone();
        let on_ready: ReadyHook = Box::new(move || {
            logger.create_message(format!("{name} listening")).set_level(Level::Info).send();
        });
        self.transport.listen(on_ready).await?;
        Ok(())
    }

    /// Idempotent: stops the health loop and closes the transport.
    pub async fn close(&self) -> Result<(), ServiceError> {
        if let Some(tx) = self.health_close_tx.lock().take() {
            let _ = tx.send(()).await;
        }
        self.transport.close().await?;
        Ok(())
    }

    async fn install_health_check(&self) -> Result<(), ServiceError> {
        let summary = self.health.lock().summary();
        let codec = self.codec.clone();
        let handler: HandleFn = Arc::new(move |_bytes, reply| {
            let (text, is_crit) = crate::health::render_status(&summary);
            let mut response = Response::new();
            let _ = response.set_payload(&codec, &HealthPayload { summary: &text });
            if is_crit {
                response.set_error(StructuredError::new(codes::CRIT).with_message(text));
            }
            let bytes = response.to_wire_bytes(&codec).unwrap_or_default();
            reply(Bytes::from(bytes));
        });
        self.transport
            .handle(HEALTHCHECK_ROUTE, &self.instance_name, handler)
            .await?;
        Ok(())
    }

    async fn install_handler(&self, registration: &HandlerRegistration) -> Result<(), ServiceError> {
        let full_route = path::full_route(&registration.resolved);
        let handler = Arc::clone(&registration.handler);
        let codec = self.codec.clone();
        let worker_pool = self.worker_pool.clone();
        let logger = self.logger.clone();
        let log_policy = registration.log_policy;
        let transport_handler: HandleFn = Arc::new(move |bytes, reply| {
            let handler = Arc::clone(&handler);
            let codec = codec.clone();
            let worker_pool = worker_pool.clone();
            let logger = logger.clone();
            tokio::spawn(async move {
                let response = dispatch_one(&codec, &worker_pool, &logger, log_policy, handler, bytes).await;
                let encoded = response.to_wire_bytes(&codec).unwrap_or_default();
                reply(Bytes::from(encoded));
            });
        });
        self.transport.handle(&full_route, &self.name, transport_handler).await?;
        Ok(())
    }

    // ---- outbound calls -----------------------------------------------------

    /// Encode, send, and decode. Every failure mode is written onto
    /// `response` rather than returned — `call` never fails outright.
    pub async fn call(&self, request: &Request, response: &mut Response) {
        let bytes = match request.to_wire_bytes(&self.codec) {
            Ok(bytes) => bytes,
            Err(err) => {
                response.set_error(StructuredError::new(codes::ORION_ENCODE).with_message(err.to_string()));
                return;
            }
        };

        let resolved = path::resolve(request.path(), &self.name);
        let full_route = path::full_route(&resolved);
        let timeout = request
            .timeout()
            .map(|millis| Duration::from_millis(millis.max(0) as u64))
            .unwrap_or(self.config.default_timeout);

        match self.transport.request(&full_route, Bytes::from(bytes), timeout).await {
            Ok(reply_bytes) => match Response::from_wire_bytes(&reply_bytes, &self.codec) {
                Ok(decoded) => *response = decoded,
                Err(err) => {
                    self.logger
                        .create_message(format!("failed to decode response for {}", request.path()))
                        .set_level(Level::Error)
                        .set_code(codes::ORION_DECODE)
                        .set_id(request.id())
                        .send();
                    response.set_error(StructuredError::new(codes::ORION_DECODE).with_message(err.to_string()));
                }
            },
            Err(err) => {
                response.set_error(StructuredError::new(codes::ORION_TRANSPORT).with_message(err.to_string()));
            }
        }
    }

    /// Encode `value` and publish it to `"{ownName}:{topic}"`.
    pub async fn emit<T: Serialize>(&self, topic: &str, value: &T) -> Result<(), ServiceError> {
        let bytes = self.codec.encode(value)?;
        let wire_topic = format!("{}:{}", self.name, topic);
        self.transport.publish(&wire_topic, Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Like `on`, but hands the raw transport message and a commit callback.
    /// Only backends that opt in (the partitioned log backend) support this.
    pub async fn subscribe_for_raw_msg(&self, topic: &str, handler: RawSubscribeFn) -> Result<(), ServiceError> {
        let wire_topic = format!("{}:{}", self.name, topic);
        self.transport.subscribe_raw(&wire_topic, &self.name, handler).await?;
        Ok(())
    }
}

async fn dispatch_one<C: Codec + Clone>(
    codec: &C,
    worker_pool: &WorkerPool,
    logger: &Logger,
    log_policy: LogPolicy,
    handler: HandlerFn,
    bytes: Bytes,
) -> Response {
    let codec = codec.clone();
    let logger_for_job = logger.clone();
    let result = worker_pool
        .run(move || async move {
            let request = match Request::from_wire_bytes(&bytes, &codec) {
                Ok(request) => request,
                Err(decode_err) => {
                    let mut shell = Request::new();
                    shell.set_error(StructuredError::new(codes::ORION_DECODE).with_message(decode_err.to_string()));
                    shell
                }
            };

            if let Some(err) = request.decode_error().cloned() {
                logger_for_job
                    .create_message(format!("failed to decode inbound request for {}", request.path()))
                    .set_level(Level::Error)
                    .set_id(request.id())
                    .set_code(err.code())
                    .set_line_of_code(err.loc())
                    .send();
                let mut response = Response::new();
                response.set_error(err);
                return response;
            }

            let request_for_log = request.clone();
            let response = handler(request).await;
            log_outcome(&logger_for_job, log_policy, &request_for_log, &response);
            response
        })
        .await;

    match result {
        Ok(response) => response,
        Err(panic_err) => {
            logger
                .create_message("handler panicked")
                .set_level(Level::Error)
                .set_code(codes::ORION_PANIC)
                .send();
            let mut response = Response::new();
            response.set_error(panic_err);
            response
        }
    }
}

fn log_outcome(logger: &Logger, log_policy: LogPolicy, request: &Request, response: &Response) {
    if matches!(log_policy, LogPolicy::Off) {
        return;
    }
    let level = match log_policy {
        LogPolicy::Level(l) => l,
        _ => Level::Info,
    };
    if let Some(err) = response.error() {
        logger
            .create_message(format!("handled {} with error", request.path()))
            .set_level(Level::Error)
            .set_id(request.id())
            .set_code(err.code())
            .set_line_of_code(err.loc())
            .send();
    } else {
        logger
            .create_message(format!("handled {}", request.path()))
            .set_level(level)
            .set_id(request.id())
            .send();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sum {
        a: i32,
        b: i32,
    }

    fn sum_handler() -> HandlerFn {
        Arc::new(|request| {
            Box::pin(async move {
                let codec = JsonCodec;
                let mut response = Response::new();
                match request.parse_params::<Sum>(&codec) {
                    Ok(input) => {
                        let _ = response.set_payload(&codec, &(input.a + input.b));
                    }
                    Err(err) => {
                        response.set_error(StructuredError::new(codes::ORION_DECODE).with_message(err.to_string()));
                    }
                }
                response
            })
        })
    }

    #[tokio::test]
    async fn add_service_sum_round_trips_through_the_mock_transport() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let mut service = Service::new("calc");
        service.set_transport(Arc::clone(&transport));
        service.handle("sum", sum_handler());
        let service = Arc::new(service);

        let svc2 = Arc::clone(&service);
        let listen_task = tokio::spawn(async move { svc2.listen().await });
        tokio::task::yield_now().await;

        let codec = JsonCodec;
        let mut request = Request::new();
        request.set_path("sum");
        request.set_params(&codec, &Sum { a: 1, b: 2 }).unwrap();
        let mut response = Response::new();
        service.call(&request, &mut response).await;

        assert!(response.error().is_none());
        let sum: i32 = response.parse_payload(&codec).unwrap();
        assert_eq!(sum, 3);

        service.close().await.unwrap();
        listen_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn per_request_timeout_overrides_the_service_default() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let mut service = Service::new("timeout");
        service.set_transport(Arc::clone(&transport));
        service.handle(
            "test",
            Arc::new(|_request| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    Response::new()
                })
            }),
        );
        let service = Arc::new(service);

        let svc2 = Arc::clone(&service);
        let listen_task = tokio::spawn(async move { svc2.listen().await });
        tokio::task::yield_now().await;

        let codec = JsonCodec;

        let mut default_request = Request::new();
        default_request.set_path("test");
        let mut default_response = Response::new();
        service.call(&default_request, &mut default_response).await;
        assert_eq!(default_response.error().unwrap().code(), codes::ORION_TRANSPORT);

        let mut overridden = Request::new();
        overridden.set_path("test");
        overridden.set_timeout(300);
        let mut overridden_response = Response::new();
        service.call(&overridden, &mut overridden_response).await;
        assert!(overridden_response.error().is_none());

        let _ = codec;
        service.close().await.unwrap();
        listen_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn prefix_routing_records_the_group_for_registry_registration() {
        #[derive(Default)]
        struct CapturingRegistry {
            seen: Mutex<Vec<Vec<String>>>,
        }

        #[async_trait::async_trait]
        impl Registry for CapturingRegistry {
            async fn register(&self, _name: &str, _instance: &str, prefixes: &[String]) -> Result<(), RegistryError> {
                self.seen.lock().push(prefixes.to_vec());
                Ok(())
            }
        }

        let registry = Arc::new(CapturingRegistry::default());
        let mut service = Service::new("calc");
        service.set_registry(Arc::clone(&registry) as Arc<dyn Registry>);
        service.handle("math/sum", sum_handler());
        let service = Arc::new(service);

        let svc2 = Arc::clone(&service);
        let listen_task = tokio::spawn(async move { svc2.listen().await });
        tokio::task::yield_now().await;

        let seen = registry.seen.lock().clone();
        assert_eq!(seen, vec![vec!["math".to_string()]]);

        service.close().await.unwrap();
        listen_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn emit_and_on_round_trip_across_two_service_handles_sharing_a_transport() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let received = Arc::new(AtomicUsize::new(0));

        let mut subscriber = Service::new("pubsub");
        subscriber.set_transport(Arc::clone(&transport));
        let received_clone = Arc::clone(&received);
        subscriber.on(
            "event",
            Arc::new(move |_bytes| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let subscriber = Arc::new(subscriber);
        let sub2 = Arc::clone(&subscriber);
        let listen_task = tokio::spawn(async move { sub2.listen().await });
        tokio::task::yield_now().await;

        let mut emitter = Service::new("pubsub");
        emitter.set_transport(Arc::clone(&transport));
        let emitter = Arc::new(emitter);
        emitter.emit("event", &serde_json::json!(null)).await.unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 1);

        subscriber.close().await.unwrap();
        listen_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn health_check_disabled_registers_no_healthcheck_route() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let mut service = Service::new("quiet");
        service.set_transport(Arc::clone(&transport));
        service.set_config(ServiceConfig {
            health_check_disabled: true,
            ..ServiceConfig::default()
        });
        let service = Arc::new(service);

        let svc2 = Arc::clone(&service);
        let listen_task = tokio::spawn(async move { svc2.listen().await });
        tokio::task::yield_now().await;

        let codec = JsonCodec;
        let mut request = Request::new();
        request.set_path(format!("{}/{}", service.instance_name(), HEALTHCHECK_ROUTE));
        let mut response = Response::new();
        service.call(&request, &mut response).await;
        assert_eq!(response.error().unwrap().code(), codes::ORION_TRANSPORT);
        let _ = codec;

        service.close().await.unwrap();
        listen_task.await.unwrap().unwrap();
    }
}
