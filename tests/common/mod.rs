//! Shared helpers for the RPC integration tests.

use courier_core::config::RpcConfig;
use courier_core::messaging::{Broker, MemoryDriver, QueueDriver};
use courier_core::rpc::{DispatchTable, RpcServer, ServerState, ServerStateHandle};
use std::sync::Arc;
use std::time::Duration;

/// Test configuration with tightened polling so suites finish quickly.
pub fn test_config() -> RpcConfig {
    let mut config = RpcConfig::default();
    config.client.poll_interval_ms = 20;
    config.server.idle_poll_ms = 20;
    config
}

/// In-process broker with the well-known queues pre-declared.
pub async fn memory_broker(config: &RpcConfig) -> (Arc<MemoryDriver>, Broker) {
    let driver = Arc::new(MemoryDriver::new());
    for queue in [
        &config.queues.auth_validation,
        &config.queues.team_rpc,
        &config.queues.task_rpc,
    ] {
        driver.ensure_queue(queue).await.unwrap();
    }
    let broker = Broker::with_driver(driver.clone());
    (driver, broker)
}

/// Spawn a consumer loop and hand back its state handle.
pub fn spawn_server(
    broker: &Broker,
    queue: &str,
    table: DispatchTable,
    config: &RpcConfig,
) -> ServerStateHandle {
    let server = RpcServer::new(broker.clone(), queue, table, config.server.clone());
    let state = server.state_handle();
    tokio::spawn(server.run());
    state
}

/// Block until the server has bound its queue.
pub async fn wait_until_listening(state: &ServerStateHandle) {
    for _ in 0..500 {
        if matches!(state.get(), ServerState::Listening | ServerState::Handling) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never started listening");
}
