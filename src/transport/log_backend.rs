//! Partitioned log backend (e.g. Kafka-shaped). Topics are auto-created on
//! first use; `subscribe` joins a consumer group and commits after the
//! cooked handler returns, while `subscribe_raw` leaves commit timing to
//! the caller. `handle`/`request` are programmer errors here — this backend
//! has no reply channel. The broker protocol lives behind [`LogDriver`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::LogBackendConfig;

use super::shared::{listen_until_closed, CloseState};
use super::{
    CloseHandler, CommitFn, HandleFn, RawSubscribeFn, ReadyHook, SubscribeFn, Transport,
    TransportError,
};

#[async_trait]
pub trait LogDriver: Send + Sync + 'static {
    async fn ensure_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication_factor: u16,
    ) -> Result<(), TransportError>;

    async fn produce(&self, topic: &str, partition: Option<u32>, payload: Bytes) -> Result<(), TransportError>;

    /// Joins `group` and delivers every message to `handler` until the
    /// subscription is torn down. The driver owns poll/fetch loop details.
    async fn consume(&self, topic: &str, group: &str, handler: RawSubscribeFn) -> Result<(), TransportError>;
}

pub struct LogTransport {
    driver: Arc<dyn LogDriver>,
    config: LogBackendConfig,
    close: Arc<CloseState>,
}

impl LogTransport {
    pub fn new(driver: Arc<dyn LogDriver>, config: LogBackendConfig) -> Self {
        Self {
            driver,
            config,
            close: Arc::new(CloseState::new()),
        }
    }
}

/// `:` in logical routes is normalized to `_` for this backend's topic
/// naming (colons are reserved for the in-process pub/sub convention
/// `{ownName}:{topic}` used at the service layer).
fn to_topic_name(route: &str) -> String {
    route.replace(':', "_")
}

#[async_trait]
impl Transport for LogTransport {
    async fn listen(&self, on_ready: ReadyHook) -> Result<(), TransportError> {
        listen_until_closed(&self.close, on_ready).await
    }

    async fn publish(&self, route: &str, bytes: Bytes) -> Result<(), TransportError> {
        let topic = to_topic_name(route);
        self.driver
            .ensure_topic(&topic, self.config.topic_partitions, self.config.topic_replication_factor)
            .await?;
        self.driver
            .produce(&topic, self.config.producer_partition, bytes)
            .await
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: SubscribeFn,
    ) -> Result<(), TransportError> {
        let topic_name = to_topic_name(topic);
        self.driver
            .ensure_topic(&topic_name, self.config.topic_partitions, self.config.topic_replication_factor)
            .await?;
        let wrapped: RawSubscribeFn = Arc::new(move |bytes, commit| {
            handler(bytes);
            commit();
        });
        self.driver.consume(&topic_name, group, wrapped).await
    }

    async fn subscribe_raw(
        &self,
        topic: &str,
        group: &str,
        handler: RawSubscribeFn,
    ) -> Result<(), TransportError> {
        let topic_name = to_topic_name(topic);
        self.driver
            .ensure_topic(&topic_name, self.config.topic_partitions, self.config.topic_replication_factor)
            .await?;
        self.driver.consume(&topic_name, group, handler).await
    }

    async fn handle(&self, _route: &str, _group: &str, _handler: HandleFn) -> Result<(), TransportError> {
        panic!("the partitioned log transport does not implement handle/request; this is a programmer error");
    }

    async fn request(&self, _route: &str, _bytes: Bytes, _timeout: Duration) -> Result<Bytes, TransportError> {
        panic!("the partitioned log transport does not implement handle/request; this is a programmer error");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDriver {
        ensured: Mutex<Vec<String>>,
        produced: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait]
    impl LogDriver for FakeDriver {
        async fn ensure_topic(&self, topic: &str, _p: u32, _r: u16) -> Result<(), TransportError> {
            self.ensured.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn produce(&self, topic: &str, _partition: Option<u32>, payload: Bytes) -> Result<(), TransportError> {
            self.produced.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }

        async fn consume(&self, _topic: &str, _group: &str, _handler: RawSubscribeFn) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_normalizes_colons_and_ensures_the_topic() {
        let driver = Arc::new(FakeDriver::default());
        let transport = LogTransport::new(driver.clone(), LogBackendConfig::default());
        transport.publish("pubsub:event", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(driver.ensured.lock().unwrap()[0], "pubsub_event");
        assert_eq!(driver.produced.lock().unwrap()[0].0, "pubsub_event");
    }

    #[tokio::test]
    #[should_panic(expected = "programmer error")]
    async fn handle_is_a_fatal_programmer_error() {
        let driver = Arc::new(FakeDriver::default());
        let transport = LogTransport::new(driver, LogBackendConfig::default());
        let _ = transport
            .handle("x", "g", Arc::new(|_bytes, _reply| {}))
            .await;
    }
}
