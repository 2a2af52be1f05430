use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single newline-delimited JSON-RPC object, as used by both dialects.
/// Unknown fields round-trip through `extra` so a pass-through forward
/// never drops anything the pool or miner sent (§9 "fallback pass-through
/// branch for unknown methods").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl RpcMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).unwrap_or_default();
        s.push('\n');
        s
    }

    pub fn is_reply(&self) -> bool {
        self.method.is_none() && self.id.is_some()
    }

    /// `true` if `result` is present and truthy (`true`, or any non-null
    /// object/value that isn't explicitly `false`).
    pub fn result_is_truthy(&self) -> bool {
        match &self.result {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub fn has_error(&self) -> bool {
        matches!(&self.error, Some(v) if !v.is_null())
    }
}

/// JSON-RPC error reply with code 20, used for handshake and auth failures
/// (§6 "code 20 for auth/config failures").
pub fn error_reply(id: Option<Value>, message: &str) -> RpcMessage {
    RpcMessage {
        id,
        method: None,
        result: Some(Value::Null),
        error: Some(Value::Array(vec![
            Value::from(20),
            Value::String(message.to_string()),
            Value::Null,
        ])),
        params: None,
    }
}

pub fn ok_reply(id: Option<Value>, result: Value) -> RpcMessage {
    RpcMessage {
        id,
        method: None,
        params: None,
        result: Some(result),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_result_classification() {
        let truthy = RpcMessage::parse(r#"{"id":1,"result":true,"error":null}"#).unwrap();
        assert!(truthy.result_is_truthy());
        assert!(!truthy.has_error());

        let falsy = RpcMessage::parse(r#"{"id":1,"result":false,"error":null}"#).unwrap();
        assert!(!falsy.result_is_truthy());

        let errored = RpcMessage::parse(r#"{"id":1,"result":null,"error":[23,"bad share",null]}"#).unwrap();
        assert!(errored.has_error());
    }

    #[test]
    fn unparseable_extra_fields_still_round_trip_known_ones() {
        let msg = RpcMessage::parse(r#"{"id":5,"method":"mining.notify","params":[1,2,3]}"#).unwrap();
        assert_eq!(msg.method.as_deref(), Some("mining.notify"));
        assert!(msg.to_line().ends_with('\n'));
    }
}
