//! # Broker Connection Manager
//!
//! Produces live [`QueueDriver`] handles according to the configured
//! connection policy. Pooled is the default: one shared connection per
//! `Broker`, reused across calls. PerCall reconnects for every driver
//! request, which is what several of the original call sites did; nothing
//! observed depends on that behavior, but the policy stays configurable.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{BrokerConfig, ConnectionPolicy};
use crate::resilience::ReconnectBackoff;

use super::driver::QueueDriver;
use super::errors::RpcError;
use super::pgmq_driver::PgmqDriver;

/// Handle through which clients and servers obtain broker connections.
///
/// Cloning is cheap; clones share the pooled connection.
#[derive(Debug, Clone)]
pub struct Broker {
    config: BrokerConfig,
    fixed: Option<Arc<dyn QueueDriver>>,
    pooled: Arc<OnceCell<Arc<dyn QueueDriver>>>,
}

impl Broker {
    /// Create a broker handle that connects over pgmq per `config`.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            fixed: None,
            pooled: Arc::new(OnceCell::new()),
        }
    }

    /// Create a broker handle over an already-constructed driver.
    ///
    /// Used by the test suites with [`super::MemoryDriver`] and by embedders
    /// that manage the broker connection themselves.
    pub fn with_driver(driver: Arc<dyn QueueDriver>) -> Self {
        Self {
            config: BrokerConfig::default(),
            fixed: Some(driver),
            pooled: Arc::new(OnceCell::new()),
        }
    }

    /// Obtain a live driver according to the connection policy.
    ///
    /// Fails with [`RpcError::Connection`] when the broker is unreachable or
    /// rejects the credentials in the connection string; callers distinguish
    /// this from protocol-level errors.
    pub async fn driver(&self) -> Result<Arc<dyn QueueDriver>, RpcError> {
        if let Some(fixed) = &self.fixed {
            return Ok(Arc::clone(fixed));
        }

        match self.config.policy {
            ConnectionPolicy::Pooled => {
                let driver = self.pooled.get_or_try_init(|| self.connect()).await?;
                Ok(Arc::clone(driver))
            }
            ConnectionPolicy::PerCall => self.connect().await,
        }
    }

    async fn connect(&self) -> Result<Arc<dyn QueueDriver>, RpcError> {
        let connect_timeout = self.config.connect_timeout();
        match tokio::time::timeout(connect_timeout, PgmqDriver::connect(&self.config.database_url))
            .await
        {
            Ok(Ok(driver)) => Ok(Arc::new(driver) as Arc<dyn QueueDriver>),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::connection(format!(
                "broker connect timed out after {}s",
                connect_timeout.as_secs()
            ))),
        }
    }

    /// Block until the broker accepts connections and `queue_name` can be
    /// declared, retrying with the reconnect backoff schedule.
    ///
    /// Startup helper for server processes whose broker may come up after
    /// them; returns the last error once `max_attempts` is exhausted.
    pub async fn wait_until_ready(
        &self,
        queue_name: &str,
        max_attempts: u32,
    ) -> Result<(), RpcError> {
        let mut backoff = ReconnectBackoff::default();

        let mut last_error = RpcError::connection("broker never probed");
        for attempt in 1..=max_attempts {
            let probe = match self.driver().await {
                Ok(driver) => driver.ensure_queue(queue_name).await,
                Err(e) => Err(e),
            };

            match probe {
                Ok(()) => {
                    info!(queue = %queue_name, attempt, "Broker ready");
                    return Ok(());
                }
                Err(e) => {
                    warn!(queue = %queue_name, attempt, error = %e, "Broker not ready");
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MemoryDriver;

    #[tokio::test]
    async fn test_fixed_driver_is_shared() {
        let driver = Arc::new(MemoryDriver::new());
        let broker = Broker::with_driver(driver.clone());

        let a = broker.driver().await.unwrap();
        let b = broker.driver().await.unwrap();
        a.ensure_queue("q").await.unwrap();
        b.send("q", &serde_json::json!(1)).await.unwrap();

        assert_eq!(driver.queue_depth("q"), 1);
    }

    #[tokio::test]
    async fn test_wait_until_ready_recovers_from_outage() {
        tokio::time::pause();

        let driver = Arc::new(MemoryDriver::new());
        driver.set_unavailable(true);
        let broker = Broker::with_driver(driver.clone());

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.wait_until_ready("q", 10).await })
        };

        // Lift the outage after the first few probes.
        tokio::time::sleep(std::time::Duration::from_secs(4)).await;
        driver.set_unavailable(false);

        waiter.await.unwrap().unwrap();
        assert_eq!(driver.queue_depth("q"), 0);
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        tokio::time::pause();

        let driver = Arc::new(MemoryDriver::new());
        driver.set_unavailable(true);
        let broker = Broker::with_driver(driver);

        let err = broker.wait_until_ready("q", 3).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
