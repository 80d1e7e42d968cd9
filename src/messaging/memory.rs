//! # In-Process Queue Driver
//!
//! [`QueueDriver`] implementation backed by in-process queues. Used by the
//! test suites and for local development without a broker; it honors the same
//! lease/ack contract as the pgmq driver, including reappearance of leased
//! messages whose lease expired before deletion.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::driver::{QueueDriver, QueueMessage};
use super::errors::RpcError;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    body: Value,
    visible_at: Instant,
}

/// Broker driver backed by in-process queues.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    queues: DashMap<String, Mutex<VecDeque<StoredMessage>>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a connection error, or lift
    /// the outage again. Lets tests drive the reconnect/backoff cycle.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of messages currently stored in a queue, leased or not.
    pub fn queue_depth(&self, queue_name: &str) -> usize {
        self.queues
            .get(queue_name)
            .map(|q| q.lock().len())
            .unwrap_or(0)
    }

    /// Names of all queues that currently exist.
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }

    fn check_available(&self, queue_name: &str, operation: &str) -> Result<(), RpcError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RpcError::queue_operation(
                queue_name,
                operation,
                "broker marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueDriver for MemoryDriver {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), RpcError> {
        self.check_available(queue_name, "create")?;
        self.queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn drop_queue(&self, queue_name: &str) -> Result<(), RpcError> {
        self.check_available(queue_name, "destroy")?;
        self.queues.remove(queue_name);
        Ok(())
    }

    async fn send(&self, queue_name: &str, body: &Value) -> Result<i64, RpcError> {
        self.check_available(queue_name, "send")?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = self.queues.entry(queue_name.to_string()).or_default();
        entry.lock().push_back(StoredMessage {
            id,
            body: body.clone(),
            visible_at: Instant::now(),
        });
        Ok(id)
    }

    async fn read_one(
        &self,
        queue_name: &str,
        lease: Duration,
    ) -> Result<Option<QueueMessage>, RpcError> {
        self.check_available(queue_name, "read")?;

        let queue = match self.queues.get(queue_name) {
            Some(queue) => queue,
            None => {
                return Err(RpcError::queue_operation(
                    queue_name,
                    "read",
                    "queue does not exist",
                ))
            }
        };

        let now = Instant::now();
        let mut messages = queue.lock();
        for stored in messages.iter_mut() {
            if stored.visible_at <= now {
                stored.visible_at = now + lease;
                return Ok(Some(QueueMessage {
                    id: stored.id,
                    body: stored.body.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn delete(&self, queue_name: &str, message_id: i64) -> Result<(), RpcError> {
        self.check_available(queue_name, "delete")?;

        if let Some(queue) = self.queues.get(queue_name) {
            queue.lock().retain(|stored| stored.id != message_id);
        }
        Ok(())
    }

    async fn purge(&self, queue_name: &str) -> Result<u64, RpcError> {
        self.check_available(queue_name, "purge")?;

        match self.queues.get(queue_name) {
            Some(queue) => {
                let mut messages = queue.lock();
                let purged = messages.len() as u64;
                messages.clear();
                Ok(purged)
            }
            None => Ok(0),
        }
    }
}
