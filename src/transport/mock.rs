//! In-memory transport for tests and local development: no sockets, no
//! broker, just maps of registered handlers guarded by a lock. Delivery
//! semantics (queue-group fan-out, at-most-once per group) are implemented
//! directly rather than delegated to a driver, since there is no real
//! network to abstract away here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::oneshot;

use super::shared::{listen_until_closed, CloseState};
use super::{CloseHandler, HandleFn, ReadyHook, SubscribeFn, Transport, TransportError};

type HandlerTable = RwLock<HashMap<String, Vec<(String, HandleFn)>>>;
type SubscriberTable = RwLock<HashMap<String, Vec<(String, SubscribeFn)>>>;

#[derive(Default)]
pub struct MockTransport {
    close: Arc<CloseState>,
    handlers: Arc<HandlerTable>,
    subscribers: Arc<SubscriberTable>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            close: Arc::new(CloseState::new()),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen(&self, on_ready: ReadyHook) -> Result<(), TransportError> {
        listen_until_closed(&self.close, on_ready).await
    }

    async fn publish(&self, route: &str, bytes: Bytes) -> Result<(), TransportError> {
        let subscribers = self.subscribers.read();
        if let Some(entries) = subscribers.get(route) {
            let mut seen_groups = Vec::new();
            for (group, handler) in entries {
                if seen_groups.contains(group) {
                    continue;
                }
                seen_groups.push(group.clone());
                handler(bytes.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: SubscribeFn,
    ) -> Result<(), TransportError> {
        self.subscribers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((group.to_string(), handler));
        Ok(())
    }

    async fn handle(&self, route: &str, group: &str, handler: HandleFn) -> Result<(), TransportError> {
        self.handlers
            .write()
            .entry(route.to_string())
            .or_default()
            .push((group.to_string(), handler));
        Ok(())
    }

    async fn request(&self, route: &str, bytes: Bytes, timeout: Duration) -> Result<Bytes, TransportError> {
        let handler = {
            let handlers = self.handlers.read();
            handlers.get(route).and_then(|entries| entries.first()).map(|(_, h)| Arc::clone(h))
        };
        let Some(handler) = handler else {
            return Err(TransportError::Driver(format!("no handler registered for route {route}")));
        };

        let (tx, rx) = oneshot::channel::<Bytes>();
        let reply: super::ReplyFn = Box::new(move |response| {
            let _ = tx.send(response);
        });
        handler(bytes, reply);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Driver("handler dropped the reply channel".to_string())),
            Err(_) => Err(TransportError::Timeout {
                route: route.to_string(),
                timeout,
            }),
        }
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
