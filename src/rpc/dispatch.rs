//! # Action Dispatch Table
//!
//! Static mapping from an action name to an async handler operating on the
//! owning service's data. The table is the only service-specific piece of the
//! RPC machinery; everything else is shared across the fleet. New actions are
//! added by registering another handler.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Failure raised by an action handler.
///
/// `Rejected` is a business refusal (invalid token, malformed parameters) and
/// carries the machine-readable reason that goes on the wire verbatim.
/// `Internal` is an unexpected failure inside the handler or its storage.
/// Both become well-formed `{ok: false}` replies; neither ever terminates the
/// consumer loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("{message}")]
    Internal { message: String },
}

impl HandlerError {
    /// Create a business rejection with a machine-readable reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create an unexpected-failure error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The failure reason as it appears in the response envelope.
    pub fn wire_reason(&self) -> &str {
        match self {
            HandlerError::Rejected { reason } => reason,
            HandlerError::Internal { message } => message,
        }
    }
}

/// Outcome of resolving and running an action. Internal to the server loop;
/// both variants are translated into `{ok: false}` replies there.
#[derive(Debug)]
pub enum DispatchError {
    UnknownAction,
    Handler(HandlerError),
}

/// Boxed future returned by an action handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Per-service mapping from action names to handlers.
///
/// ```rust
/// use courier_core::rpc::DispatchTable;
/// use futures::FutureExt;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut table = DispatchTable::new();
/// table.register("ping", |payload| async move { Ok(payload) }.boxed());
///
/// let echoed = table.dispatch("ping", json!({"n": 1})).await.unwrap();
/// assert_eq!(echoed, json!({"n": 1}));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an action name, replacing any previous one.
    pub fn register<F>(&mut self, action: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers.insert(action.into(), Arc::new(handler));
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered action names, for startup logging.
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Resolve `action` and run its handler on `payload`.
    ///
    /// Handler panics are contained and reported as an internal failure, so
    /// one bad request can never take the consumer loop down with it.
    pub async fn dispatch(&self, action: &str, payload: Value) -> Result<Value, DispatchError> {
        let handler = self
            .handlers
            .get(action)
            .ok_or(DispatchError::UnknownAction)?;

        match tokio::spawn((handler)(payload)).await {
            Ok(result) => result.map_err(DispatchError::Handler),
            Err(join_error) => {
                error!(action = %action, error = %join_error, "Action handler panicked");
                Err(DispatchError::Handler(HandlerError::internal(
                    "internal_error",
                )))
            }
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("actions", &self.actions())
            .finish()
    }
}
