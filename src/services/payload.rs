//! Shared payload plumbing for the service dispatch tables and typed clients.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::messaging::RpcError;
use crate::rpc::HandlerError;

/// Extract a required string parameter from an action payload.
pub(crate) fn require_str(payload: &Value, field: &str) -> Result<String, HandlerError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HandlerError::rejected("invalid_payload"))
}

/// Extract a required integer parameter from an action payload.
pub(crate) fn require_i64(payload: &Value, field: &str) -> Result<i64, HandlerError> {
    payload
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::rejected("invalid_payload"))
}

/// Serialize a handler result for the response envelope's `data` field.
pub(crate) fn to_wire<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::internal(e.to_string()))
}

/// Deserialize a success reply's `data` field into the typed result.
pub(crate) fn from_wire<T: DeserializeOwned>(data: Option<Value>) -> Result<T, RpcError> {
    let data = data.ok_or_else(|| RpcError::invalid_response("success reply missing data"))?;
    serde_json::from_value(data).map_err(|e| RpcError::invalid_response(e.to_string()))
}

/// The failure reason from an `{ok: false}` reply, tolerating its absence.
pub(crate) fn failure_reason(error: Option<String>) -> String {
    error.unwrap_or_else(|| "unspecified_error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let payload = json!({"token": "abc", "n": 3});
        assert_eq!(require_str(&payload, "token").unwrap(), "abc");
        assert!(require_str(&payload, "missing").is_err());
        assert!(require_str(&payload, "n").is_err());
    }

    #[test]
    fn test_require_i64() {
        let payload = json!({"user_id": 42, "name": "x"});
        assert_eq!(require_i64(&payload, "user_id").unwrap(), 42);
        assert!(require_i64(&payload, "name").is_err());
        assert!(require_i64(&json!(null), "user_id").is_err());
    }

    #[test]
    fn test_from_wire_missing_data() {
        let err = from_wire::<Value>(None).unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse { .. }));
    }

    #[test]
    fn test_failure_reason_default() {
        assert_eq!(failure_reason(Some("denied".to_string())), "denied");
        assert_eq!(failure_reason(None), "unspecified_error");
    }
}
