//! Encrypted HTTP/2 gateway backend. Every operation maps to an HTTP call
//! on a TLS-terminated gateway; this backend also implements [`Registry`]
//! by PUT-ing a registration record. Route-to-URL formatting and the
//! registration body shape live here; the actual HTTP/TLS client and
//! certificate loading are a host-supplied [`GatewayHttpClient`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::registry::{Registry, RegistryError};

use super::shared::{listen_until_closed, CloseState};
use super::{CloseHandler, HandleFn, ReadyHook, SubscribeFn, Transport, TransportError};

/// Driver surface a host implements against a real HTTP/2 + TLS client.
#[async_trait]
pub trait GatewayHttpClient: Send + Sync + 'static {
    async fn post(&self, url: &str, body: Bytes, timeout: Duration) -> Result<Bytes, TransportError>;

    async fn put_json(&self, url: &str, body: serde_json::Value) -> Result<(), TransportError>;

    /// Wire an inbound route to `handler` on whatever HTTP server the host
    /// runs in front of this gateway. The server itself, and its TLS
    /// material, are the host's responsibility.
    fn register_route(&self, route: &str, handler: HandleFn);
}

pub struct GatewayTransport {
    client: Arc<dyn GatewayHttpClient>,
    config: GatewayConfig,
    instance_address: String,
    instance_port: u16,
    close: Arc<CloseState>,
    registered_prefixes: RwLock<Vec<String>>,
}

impl GatewayTransport {
    pub fn new(
        client: Arc<dyn GatewayHttpClient>,
        config: GatewayConfig,
        instance_address: impl Into<String>,
        instance_port: u16,
    ) -> Self {
        Self {
            client,
            config,
            instance_address: instance_address.into(),
            instance_port,
            close: Arc::new(CloseState::new()),
            registered_prefixes: RwLock::new(Vec::new()),
        }
    }

    fn url_for(&self, group: &str, route: &str) -> String {
        let path = super::shared::split_path(&format!("{group}/{route}")).join("/");
        format!("{}/{}", self.config.gateway_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn listen(&self, on_ready: ReadyHook) -> Result<(), TransportError> {
        listen_until_closed(&self.close, on_ready).await
    }

    async fn publish(&self, route: &str, bytes: Bytes) -> Result<(), TransportError> {
        let parts = super::shared::split_path(route);
        let (group, rest) = parts.split_first().ok_or(TransportError::Unsupported("empty route"))?;
        let url = self.url_for(group, &rest.join("/"));
        self.client.post(&url, bytes, Duration::from_secs(5)).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        handler: SubscribeFn,
    ) -> Result<(), TransportError> {
        let wrapped: HandleFn = Arc::new(move |bytes, _reply| handler(bytes));
        self.client.register_route(&format!("{group}/{topic}"), wrapped);
        Ok(())
    }

    async fn handle(&self, route: &str, group: &str, handler: HandleFn) -> Result<(), TransportError> {
        self.registered_prefixes.write().push(group.to_string());
        self.client.register_route(&format!("{group}/{route}"), handler);
        Ok(())
    }

    async fn request(&self, route: &str, bytes: Bytes, timeout: Duration) -> Result<Bytes, TransportError> {
        let parts = super::shared::split_path(route);
        let (group, rest) = parts.split_first().ok_or(TransportError::Unsupported("empty route"))?;
        let url = self.url_for(group, &rest.join("/"));
        self.client.post(&url, bytes, timeout).await
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

#[async_trait]
impl Registry for GatewayTransport {
    async fn register(
        &self,
        service_name: &str,
        instance_name: &str,
        prefixes: &[String],
    ) -> Result<(), RegistryError> {
        let url = format!(
            "{}/v1/agent/service/register",
            self.config.registry_url.trim_end_matches('/')
        );
        let health_check_url = format!(
            "{}/{}/healthcheck",
            self.config.gateway_url.trim_end_matches('/'),
            instance_name
        );
        let body = json!({
            "ID": instance_name,
            "Name": service_name,
            "Address": self.instance_address,
            "Port": self.instance_port,
            "Tags": prefixes,
            "Check": {
                "Args": ["curl", "-f", &health_check_url],
                "Interval": "30s",
            },
        });
        self.client
            .put_json(&url, body)
            .await
            .map_err(|e| RegistryError(e.to_string()))
    }
}
