//! Explicit, testable configuration records. Each component reads its own
//! slice of the environment exactly once via a `from_env()` constructor;
//! nothing in this crate reaches for `std::env` anywhere else, so tests
//! build these records directly and never touch process globals.

use std::time::Duration;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Top-level service options: worker pool size, default call timeout,
/// health-check toggle, and the port the status endpoint binds when a
/// backend exposes one over HTTP.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub threadpool_size: usize,
    pub default_timeout: Duration,
    pub health_check_disabled: bool,
    pub http_server_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            threadpool_size: 1,
            default_timeout: Duration::from_millis(200),
            health_check_disabled: false,
            http_server_port: 0,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            threadpool_size: env_parsed("THREADPOOL_SIZE", 1),
            default_timeout: Duration::from_millis(200),
            health_check_disabled: env_bool("DISABLE_HEALTH_CHECK", false),
            http_server_port: env_parsed("HTTP_SERVER_PORT", 0),
        }
    }
}

/// Bus (message-broker) backend connection settings.
#[derive(Clone, Debug)]
pub struct BusConfig {
    pub url: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
        }
    }
}

impl BusConfig {
    pub fn from_env() -> Self {
        let url = std::env::var("NATS_URL")
            .or_else(|_| std::env::var("BUS_URL"))
            .unwrap_or_else(|_| Self::default().url);
        Self { url }
    }
}

/// Partitioned-log backend connection and topic-provisioning settings.
#[derive(Clone, Debug)]
pub struct LogBackendConfig {
    pub host: String,
    pub group_id: String,
    pub offset_reset: String,
    pub socket_timeout: Duration,
    pub topic_partitions: u32,
    pub topic_replication_factor: u16,
    pub producer_partition: Option<u32>,
}

impl Default for LogBackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:9092".to_string(),
            group_id: "default-group".to_string(),
            offset_reset: "earliest".to_string(),
            socket_timeout: Duration::from_millis(60_000),
            topic_partitions: 1,
            topic_replication_factor: 1,
            producer_partition: None,
        }
    }
}

impl LogBackendConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: env_or("KAFKA_HOST", &default.host),
            group_id: env_or("KAFKA_GROUP_ID", &default.group_id),
            offset_reset: env_or("KAFKA_OFFSET_RESET", &default.offset_reset),
            socket_timeout: Duration::from_millis(env_parsed(
                "KAFKA_SOCKET_TIMEOUT_MS",
                default.socket_timeout.as_millis() as u64,
            )),
            topic_partitions: env_parsed("KAFKA_TOPIC_PARTITION", default.topic_partitions),
            topic_replication_factor: env_parsed(
                "KAFKA_TOPIC_REPLICATION_FACTOR",
                default.topic_replication_factor,
            ),
            producer_partition: std::env::var("KAFKA_PRODUCER_PARTITION")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Gateway backend: upstream URL, registry URL, and TLS material paths. The
/// actual certificate loading is a host responsibility; this record only
/// carries the paths the host-supplied `GatewayHttpClient` needs.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub gateway_url: String,
    pub registry_url: String,
    pub ssl_cert_path: Option<String>,
    pub ssl_key_path: Option<String>,
    pub skip_verification_cacert_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: "https://127.0.0.1:8443".to_string(),
            registry_url: "http://127.0.0.1:8500".to_string(),
            ssl_cert_path: None,
            ssl_key_path: None,
            skip_verification_cacert_path: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            gateway_url: env_or("GATEWAY_URL", &default.gateway_url),
            registry_url: env_or("CONSUL_API_URL", &default.registry_url),
            ssl_cert_path: std::env::var("ORION_DEFAULT_SSL_CERT").ok(),
            ssl_key_path: std::env::var("ORION_DEFAULT_SSL_KEY").ok(),
            skip_verification_cacert_path: std::env::var("SKIP_TRAEFIK_VERIFICATION_CACERT").ok(),
        }
    }
}
