//! # RPC Client
//!
//! One-shot, correlation-tracked request/reply handle. A client declares a
//! private reply queue at open, publishes each request to a service's
//! well-known queue, and polls the reply queue in bounded slices until the
//! matching reply arrives or the timeout elapses.
//!
//! One call may be outstanding per client instance at a time; the exclusive
//! borrow on [`RpcClient::call`] enforces that at compile time. Concurrent
//! callers use separate client instances with separate reply queues, which
//! also isolates failure between them.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::messaging::broker::Broker;
use crate::messaging::driver::QueueDriver;
use crate::messaging::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::messaging::errors::RpcError;

/// Request/reply handle over the broker.
#[derive(Debug)]
pub struct RpcClient {
    driver: Arc<dyn QueueDriver>,
    reply_queue: String,
    config: ClientConfig,
}

impl RpcClient {
    /// Connect and declare this instance's private reply queue.
    pub async fn open(broker: &Broker, config: ClientConfig) -> Result<Self, RpcError> {
        let driver = broker.driver().await?;
        let reply_queue = format!("rpc_reply_{}", Uuid::new_v4().simple());
        driver.ensure_queue(&reply_queue).await?;

        debug!(reply_queue = %reply_queue, "RPC client opened");
        Ok(Self {
            driver,
            reply_queue,
            config,
        })
    }

    /// The private reply queue this instance consumes from.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Publish one request and block until the matching reply or `timeout`.
    ///
    /// Replies whose correlation id does not match the in-flight call belong
    /// to a stale or unrelated call; they are acknowledged and dropped
    /// silently, never surfaced.
    ///
    /// A returned envelope with `ok: false` is a well-formed business answer.
    /// Transport failures surface as distinct errors: connection-class
    /// ([`RpcError::is_unavailable`]) when the broker could not be reached or
    /// the publish failed, [`RpcError::Timeout`] when no matching reply
    /// arrived in budget, [`RpcError::InvalidResponse`] when the matching
    /// reply was malformed.
    #[instrument(skip(self, payload), fields(reply_queue = %self.reply_queue))]
    pub async fn call(
        &mut self,
        queue_name: &str,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RpcError> {
        if action.is_empty() {
            return Err(RpcError::invalid_request("action is empty"));
        }
        if timeout.is_zero() {
            return Err(RpcError::invalid_request("timeout must be positive"));
        }

        let request = RequestEnvelope::new(action, payload, self.reply_queue.clone());
        let correlation_id = request.correlation_id.clone();
        let body = request.encode()?;

        self.driver.send(queue_name, &body).await?;
        debug!(
            queue = %queue_name,
            action = %action,
            correlation_id = %correlation_id,
            "Request published"
        );

        self.wait_for_reply(action, &correlation_id, timeout).await
    }

    async fn wait_for_reply(
        &mut self,
        action: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RpcError> {
        let deadline = Instant::now() + timeout;

        loop {
            let message = self
                .driver
                .read_one(&self.reply_queue, self.config.reply_lease())
                .await?;
            let queue_was_empty = message.is_none();

            if let Some(message) = message {
                // The reply queue is private to this instance; whatever
                // arrives on it is consumed, matched or not.
                if let Err(e) = self.driver.delete(&self.reply_queue, message.id).await {
                    warn!(msg_id = message.id, error = %e, "Failed to ack reply message");
                }

                match ResponseEnvelope::decode(&message.body) {
                    Ok(response) if response.correlation_id == correlation_id => {
                        return Ok(response);
                    }
                    Ok(response) => {
                        debug!(
                            stale_correlation_id = %response.correlation_id,
                            "Dropping reply for a different call"
                        );
                    }
                    Err(decode_error) => {
                        let stale = message
                            .body
                            .get("correlation_id")
                            .and_then(Value::as_str)
                            .is_some_and(|cid| cid != correlation_id);
                        if stale {
                            debug!("Dropping malformed stale reply");
                        } else {
                            return Err(RpcError::invalid_response(decode_error.to_string()));
                        }
                    }
                }
                // A consumed non-matching message does not reset the clock;
                // fall through to the deadline check.
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RpcError::timeout(action, timeout.as_millis() as u64));
            }

            if queue_was_empty {
                let remaining = deadline - now;
                tokio::time::sleep(self.config.poll_interval().min(remaining)).await;
            }
        }
    }

    /// Tear down the private reply queue.
    ///
    /// Best-effort: a broker outage at close time only costs the orphaned
    /// reply queue, which no other caller can ever receive from.
    pub async fn close(self) {
        if let Err(e) = self.driver.drop_queue(&self.reply_queue).await {
            warn!(reply_queue = %self.reply_queue, error = %e, "Failed to drop reply queue");
        } else {
            debug!(reply_queue = %self.reply_queue, "RPC client closed");
        }
    }

    /// Open a client, issue a single call, and close it again, releasing the
    /// reply queue on every exit path.
    ///
    /// This is the original per-call lifecycle; prefer a long-lived client
    /// where the call site allows it.
    pub async fn call_scoped(
        broker: &Broker,
        config: ClientConfig,
        queue_name: &str,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RpcError> {
        let mut client = Self::open(broker, config).await?;
        let result = client.call(queue_name, action, payload, timeout).await;
        client.close().await;
        result
    }
}
