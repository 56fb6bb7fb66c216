//! Encode/decode contract for a single value. The core never inspects the
//! bytes it carries — `params`/`payload` are opaque to everything except
//! the codec and the handler that set them.
//!
//! Encoders are scalar: one value in, one value out. Multi-value encoding
//! is a programmer error (a contract violation the caller controls), not a
//! runtime failure, so it panics rather than returning `Err`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A pluggable scalar codec. `JsonCodec` below is the reference
/// implementation used by tests and examples; msgpack or other wire
/// formats are external collaborators behind the same trait.
pub trait Codec: Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON reference codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
