//! # Task Service Surface
//!
//! Task listing by assignee or by team over the task RPC queue.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RpcConfig;
use crate::messaging::{Broker, RpcError};
use crate::rpc::{DispatchTable, HandlerError, RpcClient};

use super::payload;

/// One task as shipped to other services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub title: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
}

/// Storage seam the task service plugs into the dispatch table.
#[async_trait]
pub trait TaskBackend: Send + Sync + 'static {
    async fn tasks_for_user(&self, user_id: i64) -> Result<Vec<TaskRecord>, HandlerError>;
    async fn tasks_for_team(&self, team_id: i64) -> Result<Vec<TaskRecord>, HandlerError>;
}

/// Build the task service's dispatch table.
pub fn dispatch_table(backend: Arc<dyn TaskBackend>) -> DispatchTable {
    let mut table = DispatchTable::new();

    let user_backend = Arc::clone(&backend);
    table.register("get_user_tasks", move |request: Value| {
        let backend = Arc::clone(&user_backend);
        async move {
            let user_id = payload::require_i64(&request, "user_id")?;
            let tasks = backend.tasks_for_user(user_id).await?;
            payload::to_wire(&tasks)
        }
        .boxed()
    });

    table.register("get_team_tasks", move |request: Value| {
        let backend = Arc::clone(&backend);
        async move {
            let team_id = payload::require_i64(&request, "team_id")?;
            let tasks = backend.tasks_for_team(team_id).await?;
            payload::to_wire(&tasks)
        }
        .boxed()
    });

    table
}

/// Typed client for the task service's RPC surface.
#[derive(Debug)]
pub struct TaskClient {
    client: RpcClient,
    queue: String,
}

impl TaskClient {
    pub async fn open(broker: &Broker, config: &RpcConfig) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::open(broker, config.client.clone()).await?,
            queue: config.queues.task_rpc.clone(),
        })
    }

    pub async fn user_tasks(
        &mut self,
        user_id: i64,
        timeout: Duration,
    ) -> Result<Vec<TaskRecord>, RpcError> {
        self.list("get_user_tasks", json!({"user_id": user_id}), timeout)
            .await
    }

    pub async fn team_tasks(
        &mut self,
        team_id: i64,
        timeout: Duration,
    ) -> Result<Vec<TaskRecord>, RpcError> {
        self.list("get_team_tasks", json!({"team_id": team_id}), timeout)
            .await
    }

    async fn list(
        &mut self,
        action: &str,
        request: Value,
        timeout: Duration,
    ) -> Result<Vec<TaskRecord>, RpcError> {
        let response = self.client.call(&self.queue, action, request, timeout).await?;

        if response.ok {
            payload::from_wire(response.data)
        } else {
            Err(RpcError::remote(payload::failure_reason(response.error)))
        }
    }

    pub async fn close(self) {
        self.client.close().await;
    }
}
