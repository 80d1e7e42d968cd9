//! # Wire Envelopes
//!
//! Request and response message formats for queue-carried RPC.
//!
//! The transport has no first-class message metadata, so the correlation id
//! and the reply queue name travel inside the JSON body. Both envelopes
//! round-trip through serde: encode(decode(x)) is a no-op for any well-formed
//! envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::RpcError;

/// A request published to a service's well-known queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Caller-generated token echoed back in the reply; fresh per call.
    pub correlation_id: String,
    /// Private reply queue only the calling client instance reads from.
    pub reply_to: String,
    /// Name of the requested operation, resolved in the dispatch table.
    pub action: String,
    /// Action-specific parameters.
    #[serde(default)]
    pub payload: Value,
    /// When the caller built the envelope.
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl RequestEnvelope {
    /// Create a new request envelope with a fresh correlation id.
    pub fn new(action: impl Into<String>, payload: Value, reply_to: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            reply_to: reply_to.into(),
            action: action.into(),
            payload,
            issued_at: Utc::now(),
        }
    }

    /// Encode for queue storage.
    pub fn encode(&self) -> Result<Value, RpcError> {
        serde_json::to_value(self).map_err(|e| RpcError::serialization(e.to_string()))
    }

    /// Decode from a queue message body.
    ///
    /// Fails with [`RpcError::Decode`] when the body is not a JSON object or a
    /// required field (`correlation_id`, `reply_to`, `action`) is missing or
    /// mistyped.
    pub fn decode(body: &Value) -> Result<Self, RpcError> {
        serde_json::from_value(body.clone()).map_err(|e| RpcError::decode(e.to_string()))
    }

    /// Best-effort recovery of `(reply_to, correlation_id)` from a body that
    /// failed to decode, so the server can still answer `invalid_payload`.
    pub fn recover_reply_fields(body: &Value) -> Option<(String, String)> {
        let reply_to = body.get("reply_to")?.as_str()?;
        let correlation_id = body.get("correlation_id")?.as_str()?;
        Some((reply_to.to_string(), correlation_id.to_string()))
    }
}

/// A reply published to the caller's private reply queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id of the request this reply answers.
    pub correlation_id: String,
    /// Success flag. A `false` here is a well-formed business answer, not a
    /// transport failure.
    pub ok: bool,
    /// Action-specific result, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Short machine-readable failure reason, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Create a successful response.
    pub fn success(correlation_id: impl Into<String>, data: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a failed response with a machine-readable reason.
    pub fn failure(correlation_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ok: false,
            data: None,
            error: Some(reason.into()),
        }
    }

    /// Encode for queue storage.
    pub fn encode(&self) -> Result<Value, RpcError> {
        serde_json::to_value(self).map_err(|e| RpcError::serialization(e.to_string()))
    }

    /// Decode from a queue message body.
    pub fn decode(body: &Value) -> Result<Self, RpcError> {
        serde_json::from_value(body.clone()).map_err(|e| RpcError::decode(e.to_string()))
    }
}
