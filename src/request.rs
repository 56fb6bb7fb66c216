//! The inbound/outbound call envelope. Mutators return `&mut Self` so
//! callers can chain, mirroring the original SDK's fluent builder style.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Codec, CodecError};
use crate::error::StructuredError;

pub type Meta = HashMap<String, String>;
pub type TracerData = HashMap<String, Vec<String>>;

pub const TRACE_ID_KEY: &str = "x-trace-id";
pub const PROPAGATION_KEY: &str = "propagation";

/// A single RPC's request envelope. `meta` is never absent after
/// construction; the trace id is set at creation time and from then on is
/// only ever mutated by a tracer collaborator (never by application code).
#[derive(Clone, Debug)]
pub struct Request {
    path: String,
    params: Vec<u8>,
    meta: Meta,
    tracer_data: TracerData,
    timeout: Option<i64>,
    decode_error: Option<StructuredError>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        let mut meta = Meta::new();
        meta.insert(TRACE_ID_KEY.to_string(), Uuid::new_v4().to_string());
        Self {
            path: String::new(),
            params: Vec::new(),
            meta,
            tracer_data: TracerData::new(),
            timeout: None,
            decode_error: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn set_params<T: Serialize>(
        &mut self,
        codec: &impl Codec,
        value: &T,
    ) -> Result<&mut Self, CodecError> {
        self.params = codec.encode(value)?;
        Ok(self)
    }

    /// Set raw, already-encoded params bytes (used by the inbound
    /// dispatcher when decoding a wire message into this envelope).
    pub fn set_params_raw(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.params = bytes;
        self
    }

    pub fn parse_params<T: DeserializeOwned>(&self, codec: &impl Codec) -> Result<T, CodecError> {
        codec.decode(&self.params)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Copy every key from `m` into this request's meta map.
    pub fn set_meta(&mut self, m: &Meta) -> &mut Self {
        for (k, v) in m {
            self.meta.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn meta_prop(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn set_meta_prop(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Reads `meta["x-trace-id"]`, used for tracing and logging.
    pub fn id(&self) -> &str {
        self.meta_prop(TRACE_ID_KEY).unwrap_or_default()
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set_meta_prop(TRACE_ID_KEY, id)
    }

    pub fn tracer_data(&self) -> &TracerData {
        &self.tracer_data
    }

    pub fn set_tracer_data(&mut self, data: TracerData) -> &mut Self {
        self.tracer_data = data;
        self
    }

    pub fn timeout(&self) -> Option<i64> {
        self.timeout
    }

    /// Stores a timeout in milliseconds.
    pub fn set_timeout(&mut self, millis: i64) -> &mut Self {
        self.timeout = Some(millis);
        self
    }

    pub fn set_timeout_duration(&mut self, duration: std::time::Duration) -> &mut Self {
        self.timeout = Some(duration.as_millis() as i64);
        self
    }

    pub fn decode_error(&self) -> Option<&StructuredError> {
        self.decode_error.as_ref()
    }

    /// Set when inbound decoding of this request failed. Not transmitted.
    pub fn set_error(&mut self, err: StructuredError) -> &mut Self {
        self.decode_error = Some(err);
        self
    }

    /// Encode this envelope (path, params, meta, tracerData, timeout) for
    /// transmission. `decodeError` never crosses the wire.
    pub fn to_wire_bytes(&self, codec: &impl Codec) -> Result<Vec<u8>, CodecError> {
        codec.encode(&WireRequest {
            path: self.path.clone(),
            params: self.params.clone(),
            meta: self.meta.clone(),
            tracer_data: self.tracer_data.clone(),
            timeout: self.timeout,
        })
    }

    /// Rebuild a `Request` from bytes produced by [`Request::to_wire_bytes`].
    pub fn from_wire_bytes(bytes: &[u8], codec: &impl Codec) -> Result<Self, CodecError> {
        let wire: WireRequest = codec.decode(bytes)?;
        Ok(Self {
            path: wire.path,
            params: wire.params,
            meta: wire.meta,
            tracer_data: wire.tracer_data,
            timeout: wire.timeout,
            decode_error: None,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireRequest {
    path: String,
    params: Vec<u8>,
    meta: Meta,
    tracer_data: TracerData,
    timeout: Option<i64>,
}

/// Copy `from`'s meta and tracer data into `to`, then increment
/// `to.meta["propagation"]` by one (treating a missing value as zero).
/// Used when a handler invokes another service with the inbound request.
pub fn merge(from: &Request, to: &mut Request) {
    to.set_meta(&from.meta);
    to.set_tracer_data(from.tracer_data.clone());
    increase_propagation_level(to);
}

fn increase_propagation_level(r: &mut Request) {
    let current: i64 = r
        .meta_prop(PROPAGATION_KEY)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    r.set_meta_prop(PROPAGATION_KEY, (current + 1).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::Deserialize;

    #[test]
    fn meta_is_never_absent_after_construction() {
        let r = Request::new();
        assert!(!r.meta().is_empty());
        assert!(!r.id().is_empty());
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        a: i32,
        b: i32,
    }

    #[test]
    fn set_params_then_parse_params_round_trips() {
        let codec = JsonCodec;
        let mut r = Request::new();
        let value = Payload { a: 1, b: 2 };
        r.set_params(&codec, &value).unwrap();
        let back: Payload = r.parse_params(&codec).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn merge_copies_meta_and_tracer_data_and_bumps_propagation() {
        let mut from = Request::new();
        from.set_meta_prop("custom", "v");
        from.set_tracer_data({
            let mut td = TracerData::new();
            td.insert("span".into(), vec!["a".into(), "b".into()]);
            td
        });

        let mut to = Request::new();
        merge(&from, &mut to);

        assert_eq!(to.meta_prop("custom"), Some("v"));
        assert_eq!(to.tracer_data(), from.tracer_data());
        assert_eq!(to.meta_prop(PROPAGATION_KEY), Some("1"));

        merge(&from, &mut to);
        assert_eq!(to.meta_prop(PROPAGATION_KEY), Some("2"));
    }

    #[test]
    fn set_error_records_decode_error_without_transmitting_it() {
        let mut r = Request::new();
        assert!(r.decode_error().is_none());
        r.set_error(StructuredError::new(crate::error::codes::ORION_DECODE));
        assert!(r.decode_error().is_some());
    }

    #[test]
    fn wire_round_trip_preserves_path_params_meta_and_timeout() {
        let codec = JsonCodec;
        let mut original = Request::new();
        original.set_path("math/sum");
        original.set_params(&codec, &Payload { a: 1, b: 2 }).unwrap();
        original.set_timeout(300);
        original.set_meta_prop("custom", "v");

        let bytes = original.to_wire_bytes(&codec).unwrap();
        let rebuilt = Request::from_wire_bytes(&bytes, &codec).unwrap();

        assert_eq!(rebuilt.path(), "math/sum");
        assert_eq!(rebuilt.timeout(), Some(300));
        assert_eq!(rebuilt.meta_prop("custom"), Some("v"));
        assert!(rebuilt.decode_error().is_none());
        let payload: Payload = rebuilt.parse_params(&codec).unwrap();
        assert_eq!(payload, Payload { a: 1, b: 2 });
    }
}
