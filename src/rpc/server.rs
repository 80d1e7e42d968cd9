//! # RPC Server (Consumer Loop)
//!
//! Long-running process half of the protocol: bind a durable queue, drain it
//! one request at a time, dispatch to the action table, reply, acknowledge.
//! Broker loss is never fatal; the loop reconnects with exponential backoff
//! and resumes. Only operator shutdown stops a server process.
//!
//! Every inbound message is acknowledged exactly once, whether the handler
//! succeeded, returned a business error, or failed outright: a single bad
//! request must not cause infinite redelivery or block the queue.
//!
//! Horizontal scale-out is competing consumers: any number of server
//! processes may bind the same durable queue, and the visibility-timeout
//! lease delivers each message to exactly one of them. Ordering is only
//! guaranteed within one process's sequential handling of its own reads.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::messaging::broker::Broker;
use crate::messaging::driver::{QueueDriver, QueueMessage};
use crate::messaging::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::messaging::errors::RpcError;

use super::dispatch::{DispatchError, DispatchTable};

/// Consumer loop lifecycle states.
///
/// `DISCONNECTED → CONNECTING → LISTENING ⇄ HANDLING`, with connection loss
/// from `LISTENING`/`HANDLING` back to `DISCONNECTED` as the only error
/// transition. There is no terminal state short of process shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Disconnected = 0,
    Connecting = 1,
    Listening = 2,
    Handling = 3,
}

impl From<u8> for ServerState {
    fn from(value: u8) -> Self {
        match value {
            1 => ServerState::Connecting,
            2 => ServerState::Listening,
            3 => ServerState::Handling,
            _ => ServerState::Disconnected,
        }
    }
}

/// Shared read handle on a running server's lifecycle state.
#[derive(Debug, Clone)]
pub struct ServerStateHandle(Arc<AtomicU8>);

impl ServerStateHandle {
    pub fn get(&self) -> ServerState {
        ServerState::from(self.0.load(Ordering::Acquire))
    }
}

/// Queue consumer that serves one service's dispatch table.
#[derive(Debug)]
pub struct RpcServer {
    broker: Broker,
    queue_name: String,
    dispatch: DispatchTable,
    config: ServerConfig,
    state: Arc<AtomicU8>,
}

impl RpcServer {
    pub fn new(
        broker: Broker,
        queue_name: impl Into<String>,
        dispatch: DispatchTable,
        config: ServerConfig,
    ) -> Self {
        Self {
            broker,
            queue_name: queue_name.into(),
            dispatch,
            config,
            state: Arc::new(AtomicU8::new(ServerState::Disconnected as u8)),
        }
    }

    /// Handle for observing the loop's lifecycle state from outside.
    pub fn state_handle(&self) -> ServerStateHandle {
        ServerStateHandle(Arc::clone(&self.state))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run the consumer loop until the process is stopped.
    ///
    /// Never returns under broker failure; each lost connection goes through
    /// the reconnect/backoff cycle (1, 2, 4, ... capped, reset on success)
    /// and consumption resumes where the durable queue left off.
    #[instrument(skip(self), fields(queue = %self.queue_name))]
    pub async fn run(self) {
        info!(
            queue = %self.queue_name,
            actions = ?self.dispatch.actions(),
            "Starting RPC server"
        );

        let mut backoff = self.config.backoff();

        loop {
            self.set_state(ServerState::Connecting);

            let session = match self.broker.driver().await {
                Ok(driver) => {
                    // Durable declaration is idempotent and doubles as the
                    // liveness probe after a reconnect.
                    match driver.ensure_queue(&self.queue_name).await {
                        Ok(()) => Some(driver),
                        Err(e) => {
                            error!(error = %e, "Queue declaration failed");
                            None
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Broker connection failed");
                    None
                }
            };

            if let Some(driver) = session {
                backoff.reset();
                info!(queue = %self.queue_name, "RPC server listening");
                self.set_state(ServerState::Listening);

                if let Err(e) = self.consume(driver.as_ref()).await {
                    warn!(error = %e, "Consumer loop lost broker connection");
                }
            }

            self.set_state(ServerState::Disconnected);
            let delay = backoff.next_delay();
            info!(delay_secs = delay.as_secs(), "Reconnecting after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    /// Drain the queue until a driver operation fails.
    ///
    /// Prefetch is one: a single message is leased per iteration and the next
    /// read happens only after that message is acknowledged, serializing this
    /// process's side effects against the backing store.
    async fn consume(&self, driver: &dyn QueueDriver) -> Result<(), RpcError> {
        loop {
            let message = driver
                .read_one(&self.queue_name, self.config.lease())
                .await?;

            match message {
                Some(message) => {
                    self.set_state(ServerState::Handling);
                    self.handle_message(driver, message).await?;
                    self.set_state(ServerState::Listening);
                }
                None => {
                    tokio::time::sleep(self.config.idle_poll()).await;
                }
            }
        }
    }

    /// Process one leased message through decode → dispatch → reply → ack.
    ///
    /// Only driver failures propagate (they mean the connection is gone);
    /// everything else is translated into a `{ok: false}` reply.
    async fn handle_message(
        &self,
        driver: &dyn QueueDriver,
        message: QueueMessage,
    ) -> Result<(), RpcError> {
        let outcome = match RequestEnvelope::decode(&message.body) {
            Ok(request) => {
                debug!(
                    action = %request.action,
                    correlation_id = %request.correlation_id,
                    msg_id = message.id,
                    "Handling request"
                );
                let response = self.execute(&request).await;
                Some((request.reply_to, response))
            }
            Err(e) => {
                warn!(msg_id = message.id, error = %e, "Discarding malformed request");
                // Answer invalid_payload only when a reply address survived
                // the damage; otherwise stay silent.
                RequestEnvelope::recover_reply_fields(&message.body).map(
                    |(reply_to, correlation_id)| {
                        (
                            reply_to,
                            ResponseEnvelope::failure(correlation_id, "invalid_payload"),
                        )
                    },
                )
            }
        };

        if let Some((reply_to, response)) = outcome {
            match response.encode() {
                Ok(body) => {
                    // A failed reply publish must not prevent the ack below;
                    // the caller times out and the request is not redelivered.
                    if let Err(e) = driver.send(&reply_to, &body).await {
                        error!(reply_to = %reply_to, error = %e, "Failed to publish RPC response");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode RPC response");
                }
            }
        }

        driver.delete(&self.queue_name, message.id).await
    }

    async fn execute(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        match self
            .dispatch
            .dispatch(&request.action, request.payload.clone())
            .await
        {
            Ok(data) => ResponseEnvelope::success(request.correlation_id.clone(), data),
            Err(DispatchError::UnknownAction) => {
                warn!(action = %request.action, "Unknown action");
                ResponseEnvelope::failure(request.correlation_id.clone(), "unknown_action")
            }
            Err(DispatchError::Handler(handler_error)) => {
                warn!(
                    action = %request.action,
                    error = %handler_error,
                    "Handler failed"
                );
                ResponseEnvelope::failure(
                    request.correlation_id.clone(),
                    handler_error.wire_reason(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryDriver;
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::time::Duration;

    const QUEUE: &str = "service_rpc";

    fn echo_table() -> DispatchTable {
        let mut table = DispatchTable::new();
        table.register("echo", |payload| async move { Ok(payload) }.boxed());
        table
    }

    async fn spawn_server(driver: Arc<MemoryDriver>) -> ServerStateHandle {
        let broker = Broker::with_driver(driver);
        let server = RpcServer::new(broker, QUEUE, echo_table(), ServerConfig::default());
        let state = server.state_handle();
        tokio::spawn(server.run());
        state
    }

    async fn send_request(driver: &MemoryDriver, action: &str, payload: Value) -> RequestEnvelope {
        driver.ensure_queue("reply_q").await.unwrap();
        let request = RequestEnvelope::new(action, payload, "reply_q");
        driver
            .send(QUEUE, &request.encode().unwrap())
            .await
            .unwrap();
        request
    }

    async fn next_reply(driver: &MemoryDriver) -> ResponseEnvelope {
        loop {
            if let Some(msg) = driver
                .read_one("reply_q", Duration::from_secs(5))
                .await
                .unwrap()
            {
                driver.delete("reply_q", msg.id).await.unwrap();
                return ResponseEnvelope::decode(&msg.body).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// The ack lands after the reply publish, so give the loop a moment.
    async fn wait_until_acked(driver: &MemoryDriver, queue: &str) {
        for _ in 0..200 {
            if driver.queue_depth(queue) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("inbound message was never acknowledged");
    }

    #[tokio::test]
    async fn test_round_trip_echoes_correlation_id() {
        let driver = Arc::new(MemoryDriver::new());
        driver.ensure_queue(QUEUE).await.unwrap();
        spawn_server(driver.clone()).await;

        let request = send_request(&driver, "echo", json!({"n": 5})).await;
        let reply = next_reply(&driver).await;

        assert!(reply.ok);
        assert_eq!(reply.correlation_id, request.correlation_id);
        assert_eq!(reply.data, Some(json!({"n": 5})));
        // The inbound request was acknowledged.
        wait_until_acked(&driver, QUEUE).await;
    }

    #[tokio::test]
    async fn test_unknown_action_reply() {
        let driver = Arc::new(MemoryDriver::new());
        driver.ensure_queue(QUEUE).await.unwrap();
        spawn_server(driver.clone()).await;

        let request = send_request(&driver, "not_an_action", json!({})).await;
        let reply = next_reply(&driver).await;

        assert!(!reply.ok);
        assert_eq!(reply.correlation_id, request.correlation_id);
        assert_eq!(reply.error.as_deref(), Some("unknown_action"));
    }

    #[tokio::test]
    async fn test_malformed_request_is_acked_and_answered_when_possible() {
        let driver = Arc::new(MemoryDriver::new());
        driver.ensure_queue(QUEUE).await.unwrap();
        driver.ensure_queue("reply_q").await.unwrap();
        spawn_server(driver.clone()).await;

        // Missing action, but reply fields survive.
        driver
            .send(
                QUEUE,
                &json!({"correlation_id": "c-1", "reply_to": "reply_q"}),
            )
            .await
            .unwrap();

        let reply = next_reply(&driver).await;
        assert!(!reply.ok);
        assert_eq!(reply.correlation_id, "c-1");
        assert_eq!(reply.error.as_deref(), Some("invalid_payload"));
        wait_until_acked(&driver, QUEUE).await;
    }

    #[tokio::test]
    async fn test_unrecoverable_garbage_is_acked_silently_and_loop_survives() {
        let driver = Arc::new(MemoryDriver::new());
        driver.ensure_queue(QUEUE).await.unwrap();
        spawn_server(driver.clone()).await;

        driver.send(QUEUE, &json!("complete garbage")).await.unwrap();

        // A well-formed request right behind it still gets served.
        let request = send_request(&driver, "echo", json!({"after": true})).await;
        let reply = next_reply(&driver).await;

        assert!(reply.ok);
        assert_eq!(reply.correlation_id, request.correlation_id);
        wait_until_acked(&driver, QUEUE).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_with_backoff_reset_after_outage() {
        let driver = Arc::new(MemoryDriver::new());
        driver.ensure_queue(QUEUE).await.unwrap();
        driver.set_unavailable(true);

        let state = spawn_server(driver.clone()).await;

        // Let the loop burn through a few failed connect cycles.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.get(), ServerState::Disconnected);

        driver.set_unavailable(false);
        // The longest remaining backoff delay is capped at 30s.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(state.get(), ServerState::Listening);

        let request = send_request(&driver, "echo", json!(1)).await;
        let reply = next_reply(&driver).await;
        assert!(reply.ok);
        assert_eq!(reply.correlation_id, request.correlation_id);
    }
}
