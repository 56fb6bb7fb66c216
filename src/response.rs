//! The reply envelope. A present `error` marks the call failed for
//! log/metric purposes only — the full envelope, payload included, is
//! still returned to the caller (partial success with warning is legal).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Codec, CodecError};
use crate::error::StructuredError;

#[derive(Clone, Debug, Default)]
pub struct Response {
    payload: Vec<u8>,
    error: Option<StructuredError>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload<T: Serialize>(
        &mut self,
        codec: &impl Codec,
        value: &T,
    ) -> Result<&mut Self, CodecError> {
        self.payload = codec.encode(value)?;
        Ok(self)
    }

    pub fn set_payload_raw(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.payload = bytes;
        self
    }

    pub fn parse_payload<T: DeserializeOwned>(&self, codec: &impl Codec) -> Result<T, CodecError> {
        codec.decode(&self.payload)
    }

    pub fn error(&self) -> Option<&StructuredError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, err: StructuredError) -> &mut Self {
        self.error = Some(err);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Encode `(payload, (id, code, message))` for transmission. `loc` never
    /// crosses the wire.
    pub fn to_wire_bytes(&self, codec: &impl Codec) -> Result<Vec<u8>, CodecError> {
        codec.encode(&WireResponse {
            payload: self.payload.clone(),
            error: self.error.as_ref().map(|e| WireError {
                id: e.id().to_string(),
                code: e.code().to_string(),
                message: e.message().to_string(),
            }),
        })
    }

    /// Rebuild a `Response` from bytes produced by
    /// [`Response::to_wire_bytes`]. An error's `loc` is re-captured at this
    /// call site rather than carried from the originating process.
    pub fn from_wire_bytes(bytes: &[u8], codec: &impl Codec) -> Result<Self, CodecError> {
        let wire: WireResponse = codec.decode(bytes)?;
        let error = wire.error.map(|e| {
            let id = e.id.parse::<Uuid>().unwrap_or_else(|_| Uuid::new_v4());
            StructuredError::from_wire(id, e.code, e.message)
        });
        Ok(Self {
            payload: wire.payload,
            error,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireError {
    id: String,
    code: String,
    message: String,
}

#[derive(Serialize, Deserialize)]
struct WireResponse {
    payload: Vec<u8>,
    error: Option<WireError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sum(i32);

    #[test]
    fn set_payload_then_parse_payload_round_trips() {
        let codec = JsonCodec;
        let mut r = Response::new();
        r.set_payload(&codec, &Sum(3)).unwrap();
        let back: Sum = r.parse_payload(&codec).unwrap();
        assert_eq!(back, Sum(3));
    }

    #[test]
    fn both_payload_and_error_may_be_present() {
        let codec = JsonCodec;
        let mut r = Response::new();
        r.set_payload(&codec, &Sum(1)).unwrap();
        r.set_error(StructuredError::new("partial.warning"));
        assert!(!r.payload().is_empty());
        assert!(r.is_failure());
    }

    #[test]
    fn wire_round_trip_preserves_payload_and_error_code() {
        let codec = JsonCodec;
        let mut original = Response::new();
        original.set_payload(&codec, &Sum(7)).unwrap();
        original.set_error(StructuredError::new("CRIT").with_message("db down"));

        let bytes = original.to_wire_bytes(&codec).unwrap();
        let rebuilt = Response::from_wire_bytes(&bytes, &codec).unwrap();

        let payload: Sum = rebuilt.parse_payload(&codec).unwrap();
        assert_eq!(payload, Sum(7));
        let err = rebuilt.error().unwrap();
        assert_eq!(err.code(), "CRIT");
        assert_eq!(err.message(), "db down");
    }
}
