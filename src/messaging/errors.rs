//! # RPC Error Types
//!
//! Error taxonomy for the broker-carried RPC protocol using thiserror
//! for structured error types instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Errors surfaced by the RPC transport layer.
///
/// The taxonomy follows the protocol contract: connection-class failures are
/// recoverable on the server (reconnect with backoff) and map to an
/// "unavailable" outcome on the client, while decode and handler failures are
/// always recovered locally by the consumer loop and never escape it.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("RPC call timed out: {action} after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("Envelope decode error: {message}")]
    Decode { message: String },

    #[error("Invalid response envelope: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Remote handler failure: {reason}")]
    Remote { reason: String },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl RpcError {
    /// Create a broker connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a call timeout error
    pub fn timeout(action: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            action: action.into(),
            timeout_ms,
        }
    }

    /// Create an envelope decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a remote handler failure error
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the service could not be reached at all.
    ///
    /// Callers must treat this differently from a well-formed `{ok: false}`
    /// business reply: "service down" is not "service said no".
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RpcError::Connection { .. } | RpcError::QueueOperation { .. }
        )
    }
}

/// Conversion from serde_json::Error to RpcError
impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            RpcError::decode(err.to_string())
        } else {
            RpcError::serialization(err.to_string())
        }
    }
}

/// Result type alias for RPC transport operations
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_creation() {
        let conn_err = RpcError::connection("broker unreachable");
        assert!(matches!(conn_err, RpcError::Connection { .. }));

        let queue_err = RpcError::queue_operation("auth_validation_rpc", "send", "pool closed");
        assert!(matches!(queue_err, RpcError::QueueOperation { .. }));

        let timeout_err = RpcError::timeout("verify_token", 3000);
        assert!(matches!(timeout_err, RpcError::Timeout { .. }));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(RpcError::connection("down").is_unavailable());
        assert!(RpcError::queue_operation("q", "send", "io").is_unavailable());

        assert!(!RpcError::timeout("verify_token", 3000).is_unavailable());
        assert!(!RpcError::invalid_response("missing ok flag").is_unavailable());
        assert!(!RpcError::remote("boom").is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let queue_err = RpcError::queue_operation("team_rpc_queue", "read", "read failed");
        let display = format!("{queue_err}");
        assert!(display.contains("Queue operation failed"));
        assert!(display.contains("team_rpc_queue"));
        assert!(display.contains("read failed"));

        let timeout_err = RpcError::timeout("check_membership", 2000);
        let display = format!("{timeout_err}");
        assert!(display.contains("check_membership"));
        assert!(display.contains("2000"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let rpc_err: RpcError = json_err.into();
        assert!(matches!(rpc_err, RpcError::Decode { .. }));
    }
}
