//! Core of a microservice SDK: request/response and pub/sub over a
//! pluggable transport, with structured errors, leveled logging, a
//! dependency health loop, and optional registry integration.
//!
//! [`Service`] is the composition root; everything else in this crate is a
//! narrow collaborator it wires together.

pub mod codec;
pub mod config;
pub mod error;
pub mod health;
pub mod logger;
pub mod registry;
pub mod request;
pub mod response;
pub mod service;
pub mod transport;
pub mod worker_pool;

pub use codec::{Codec, CodecError, JsonCodec};
pub use error::{codes, LineOfCode, StructuredError};
pub use logger::{Level, LogSink, Logger, LoggerConfig};
pub use registry::{NoopRegistry, Registry, RegistryError};
pub use request::{merge, Request};
pub use response::Response;
pub use service::{HandlerFn, LogPolicy, Service, ServiceError};
pub use transport::{Transport, TransportError};
