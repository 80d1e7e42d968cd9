//! # PGMQ Queue Driver
//!
//! [`QueueDriver`] implementation over the pgmq-rs crate. Durable service
//! queues live in PostgreSQL and survive broker restarts; visibility timeouts
//! provide the per-message lease, and deleting a message is the ack.

use async_trait::async_trait;
use pgmq::PGMQueue;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::driver::{QueueDriver, QueueMessage};
use super::errors::RpcError;

/// Broker driver backed by PostgreSQL message queues.
#[derive(Debug, Clone)]
pub struct PgmqDriver {
    pgmq: PGMQueue,
}

impl PgmqDriver {
    /// Connect to the broker using a connection string.
    pub async fn connect(database_url: &str) -> Result<Self, RpcError> {
        debug!("Connecting to pgmq broker");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| RpcError::connection(e.to_string()))?;

        info!("Connected to pgmq broker");
        Ok(Self { pgmq })
    }
}

#[async_trait]
impl QueueDriver for PgmqDriver {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), RpcError> {
        debug!(queue = %queue_name, "Declaring queue");

        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "create", e.to_string()))?;

        Ok(())
    }

    async fn drop_queue(&self, queue_name: &str) -> Result<(), RpcError> {
        debug!(queue = %queue_name, "Dropping queue");

        self.pgmq
            .destroy(queue_name)
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "destroy", e.to_string()))?;

        Ok(())
    }

    async fn send(&self, queue_name: &str, body: &Value) -> Result<i64, RpcError> {
        let message_id = self
            .pgmq
            .send(queue_name, body)
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "send", e.to_string()))?;

        debug!(queue = %queue_name, msg_id = message_id, "Message sent");
        Ok(message_id)
    }

    async fn read_one(
        &self,
        queue_name: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, RpcError> {
        let vt = lease.as_secs().max(1) as i32;

        let message = self
            .pgmq
            .read::<Value>(queue_name, Some(vt))
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "read", e.to_string()))?;

        Ok(message.map(|m| QueueMessage {
            id: m.msg_id,
            body: m.message,
        }))
    }

    async fn delete(&self, queue_name: &str, message_id: i64) -> Result<(), RpcError> {
        self.pgmq
            .delete(queue_name, message_id)
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "delete", e.to_string()))?;

        debug!(queue = %queue_name, msg_id = message_id, "Message acknowledged");
        Ok(())
    }

    async fn purge(&self, queue_name: &str) -> Result<u64, RpcError> {
        let purged = self
            .pgmq
            .purge(queue_name)
            .await
            .map_err(|e| RpcError::queue_operation(queue_name, "purge", e.to_string()))?;

        debug!(queue = %queue_name, purged, "Queue purged");
        Ok(purged)
    }
}
