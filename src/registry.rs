//! The external service catalog a [`crate::service::Service`] registers
//! itself with at `Listen`, before traffic begins. A registry error at
//! that point is fatal; everything past it assumes the instance is
//! discoverable.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("registry error: {0}")]
pub struct RegistryError(pub String);

#[async_trait]
pub trait Registry: Send + Sync + 'static {
    async fn register(
        &self,
        service_name: &str,
        instance_name: &str,
        prefixes: &[String],
    ) -> Result<(), RegistryError>;
}

/// Registers nowhere. The default when no registry is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRegistry;

#[async_trait]
impl Registry for NoopRegistry {
    async fn register(
        &self,
        _service_name: &str,
        _instance_name: &str,
        _prefixes: &[String],
    ) -> Result<(), RegistryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_registry_always_succeeds() {
        let registry = NoopRegistry;
        registry
            .register("svc", "svc@id", &["math".to_string()])
            .await
            .unwrap();
    }
}
