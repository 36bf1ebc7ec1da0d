//! Event payloads and queued events.

use crate::instance::InstanceRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event parameters, a JSON object keyed by parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Default for Payload {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl Payload {
    /// An empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a copy of this payload with `key` set to `value`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.0 {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::default(),
            other => Self(other),
        }
    }
}

/// An event waiting in a dispatch turn.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub target: InstanceRef,
    pub event: String,
    pub payload: Payload,
}

impl PendingEvent {
    pub fn new(target: InstanceRef, event: impl Into<String>, payload: Payload) -> Self {
        Self {
            target,
            event: event.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_access() {
        let payload = Payload::from(json!({"p_productCode": "A1", "qty": 2, "price": 1.5}));
        assert_eq!(payload.get_str("p_productCode"), Some("A1"));
        assert_eq!(payload.get_i64("qty"), Some(2));
        assert_eq!(payload.get_f64("price"), Some(1.5));
        assert_eq!(payload.get_str("missing"), None);
    }

    #[test]
    fn test_payload_builder() {
        let payload = Payload::empty().with("code", "B2").with("n", 3);
        assert_eq!(payload.as_value(), &json!({"code": "B2", "n": 3}));
        assert_eq!(Payload::from(Value::Null), Payload::empty());
    }
}
