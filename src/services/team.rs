//! # Team Service Surface
//!
//! Membership and role checks over the team RPC queue. The original server
//! answered an action-less body; here the check is an explicit
//! `check_membership` action like every other operation in the fleet.

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

/// Membership answer for one (user, team) pair.
///
/// A non-member is a successful answer with `is_member: false`, never an
/// error: "you are not in this team" and "the team service is down" must stay
/// distinguishable at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub is_member: bool,
    pub role: Option<String>,
}

impl Membership {
    pub fn none() -> Self {
        Self {
            is_member: false,
            role: None,
        }
    }

    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            is_member: true,
            role: Some(role.into()),
        }
    }
}

/// Storage seam the team service plugs into the dispatch table.
#[async_trait]
pub trait MembershipBackend: Send + Sync + 'static {
    async fn membership(&self, user_id: i64, team_id: i64) -> Result<Membership, HandlerError>;
}

/// Build the team service's dispatch table.
pub fn dispatch_table(backend: Arc<dyn MembershipBackend>) -> DispatchTable {
    let mut table = DispatchTable::new();

    table.register("check_membership", move |request: Value| {
        let backend = Arc::clone(&backend);
        async move {
            let user_id = payload::require_i64(&request, "user_id")?;
            let team_id = payload::require_i64(&request, "team_id")?;
            let membership = backend.membership(user_id, team_id).await?;
            payload::to_wire(&membership)
        }
        .boxed()
    });

    table
}

/// Typed client for the team service's RPC surface.
#[derive(Debug)]
pub struct TeamClient {
    client: RpcClient,
    queue: String,
}

impl TeamClient {
    pub async fn open(broker: &Broker, config: &RpcConfig) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::open(broker, config.client.clone()).await?,
            queue: config.queues.team_rpc.clone(),
        })
    }

    /// Ask the team service whether `user_id` belongs to `team_id`.
    ///
    /// An `{ok: false}` reply means the check itself failed on the team
    /// service's side and surfaces as [`RpcError::Remote`]; callers deciding
    /// permissions must not read any failure as "not a member".
    pub async fn check_membership(
        &mut self,
        user_id: i64,
        team_id: i64,
        timeout: Duration,
    ) -> Result<Membership, RpcError> {
        let response = self
            .client
            .call(
                &self.queue,
                "check_membership",
                json!({"user_id": user_id, "team_id": team_id}),
                timeout,
            )
            .await?;

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
