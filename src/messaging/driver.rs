//! # Queue Driver Seam
//!
//! Trait boundary between the RPC machinery and the broker transport. The
//! production driver is [`super::PgmqDriver`]; tests and local development use
//! [`super::MemoryDriver`]. Everything above this trait is broker-agnostic.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::errors::RpcError;

/// A message leased from a queue.
///
/// The message stays invisible to other readers until `lease` elapses or it
/// is deleted. Deletion is the acknowledgement in this protocol.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Broker-assigned message id, used to delete (ack) the message.
    pub id: i64,
    /// JSON message body.
    pub body: Value,
}

/// Operations the RPC client and server need from a broker connection.
///
/// Queue declaration is idempotent and doubles as the liveness probe during
/// reconnect cycles. A single driver handle is safe to share across tasks,
/// but the protocol confines each in-flight call to one client instance.
#[async_trait]
pub trait QueueDriver: Send + Sync + std::fmt::Debug {
    /// Declare a queue, creating it if it does not exist.
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), RpcError>;

    /// Delete a queue and everything in it.
    async fn drop_queue(&self, queue_name: &str) -> Result<(), RpcError>;

    /// Publish a JSON body to a queue, returning the broker message id.
    async fn send(&self, queue_name: &str, body: &Value) -> Result<i64, RpcError>;

    /// Read at most one message, leasing it for `lease`.
    ///
    /// Returns `None` when the queue is empty. The prefetch-of-one discipline
    /// is enforced by never calling this again before deleting the previous
    /// message.
    async fn read_one(
        &self,
        queue_name: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, RpcError>;

    /// Delete (acknowledge) a message by id.
    async fn delete(&self, queue_name: &str, message_id: i64) -> Result<(), RpcError>;

    /// Delete all messages in a queue, returning how many were removed.
    async fn purge(&self, queue_name: &str) -> Result<u64, RpcError>;
}
