//! Wire codec: `{"type": .., "message": ..}` when typed, the bare payload otherwise.

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ButterResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Message type; `None` for a bare payload.
    pub kind: Option<String>,
    /// Body for typed messages, the whole payload for bare ones.
    pub message: Value,
}

impl Envelope {
    pub fn new(kind: Option<&str>, message: impl Serialize) -> ButterResult<Self> {
        Ok(Self { kind: kind.map(str::to_string), message: serde_json::to_value(message)? })
    }

    pub fn encode(&self) -> ButterResult<String> {
        let text = match &self.kind {
            Some(kind) => serde_json::to_string(&json!({ "type": kind, "message": self.message }))?,
            None => serde_json::to_string(&self.message)?,
        };
        Ok(text)
    }

    /// An object with a non-empty string `type` decodes as typed; anything
    /// else is a bare payload.
    pub fn decode(data: &str) -> ButterResult<Self> {
        let value: Value = serde_json::from_str(data)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        Ok(match kind {
            Some(kind) => {
                let message = value.get("message").cloned().unwrap_or(Value::Null);
                Self { kind: Some(kind), message }
            }
            None => Self { kind: None, message: value },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ButterError;

    #[test]
    fn test_typed_wire_shape() {
        let env = Envelope::new(Some("applyclicked"), json!({"text": "hi"})).unwrap();
        let wire: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(wire, json!({"type": "applyclicked", "message": {"text": "hi"}}));
        assert_eq!(Envelope::decode(&env.encode().unwrap()).unwrap(), env);
    }

    #[test]
    fn test_bare_payload() {
        let env = Envelope::new(None, vec![1, 2]).unwrap();
        assert_eq!(env.encode().unwrap(), "[1,2]");
        let back = Envelope::decode("[1,2]").unwrap();
        assert_eq!(back.kind, None);
        assert_eq!(back.message, json!([1, 2]));
    }

    #[test]
    fn test_typed_without_body() {
        let env = Envelope::decode(r#"{"type":"cancelclicked"}"#).unwrap();
        assert_eq!(env.kind.as_deref(), Some("cancelclicked"));
        assert_eq!(env.message, Value::Null);
    }

    #[test]
    fn test_garbage_is_wire_error() {
        assert!(matches!(Envelope::decode("{not json"), Err(ButterError::Wire(_))));
    }
}
