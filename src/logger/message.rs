//! The fluent record builder returned by [`super::Logger::create_message`].
//! Every convenience method just stuffs a fixed key into `fields`; `send`
//! is the single place that renders and dispatches.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::error::LineOfCode;

use super::{Fields, Level, Logger};

pub struct MessageBuilder {
    logger: Logger,
    fields: Fields,
}

impl MessageBuilder {
    pub(crate) fn new(logger: Logger, text: String) -> Self {
        let mut fields = Fields::new();
        fields.insert("host".into(), logger.config().record_host.clone().into());
        fields.insert("vm_host".into(), logger.config().record_host.clone().into());
        fields.insert("message".into(), text.into());
        fields.insert("timestamp".into(), unix_timestamp_secs().into());
        fields.insert("level".into(), (Level::Info.as_i8() as i64).into());
        Self { logger, fields }
    }

    pub fn set_level(mut self, level: Level) -> Self {
        self.fields.insert("level".into(), (level.as_i8() as i64).into());
        self
    }

    fn level(&self) -> Level {
        self.fields
            .get("level")
            .and_then(Value::as_i64)
            .and_then(|v| match v {
                0 => Some(Level::Emergency),
                1 => Some(Level::Alert),
                2 => Some(Level::Critical),
                3 => Some(Level::Error),
                4 => Some(Level::Warning),
                5 => Some(Level::Notice),
                6 => Some(Level::Info),
                7 => Some(Level::Debug),
                _ => Some(Level::None),
            })
            .unwrap_or(Level::Debug)
    }

    pub fn set_id(mut self, trace_id: impl Into<String>) -> Self {
        self.fields.insert("x-trace-id".into(), trace_id.into().into());
        self
    }

    pub fn set_code(mut self, code: impl Into<String>) -> Self {
        self.fields.insert("code".into(), code.into().into());
        self
    }

    /// Merge an arbitrary set of top-level keys into the record.
    pub fn set_map(mut self, extra: impl IntoIterator<Item = (String, Value)>) -> Self {
        for (key, value) in extra {
            self.fields.insert(key, value);
        }
        self
    }

    pub fn set_params<T: Serialize>(mut self, params: &T) -> Self {
        let rendered = serde_json::to_string(params).unwrap_or_default();
        self.fields.insert("params".into(), rendered.into());
        self
    }

    pub fn set_line_of_code(mut self, loc: &LineOfCode) -> Self {
        self.fields.insert("LOC".into(), loc.to_string().into());
        self
    }

    /// Render and dispatch to the sink, unless the message's level is
    /// numerically greater than the configured minimum, in which case it
    /// is dropped silently.
    pub fn send(self) {
        let level = self.level();
        if self.logger.should_skip(level) {
            return;
        }
        let rendered = serde_json::to_string(&Value::Object(self.fields))
            .expect("log fields are always valid JSON values");
        self.logger.dispatch(level, &rendered);
    }
}

fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
