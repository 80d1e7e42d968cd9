//! # Identity Service Surface
//!
//! Token validation and role administration over the auth validation queue.
//! The identity service owns the user store; other services only ever see the
//! response contract, so the storage side is a backend trait and the calling
//! side a typed wrapper over [`RpcClient`].

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

/// Reason returned when a token does not resolve to a user.
pub const INVALID_TOKEN: &str = "invalid_or_expired_token";

/// The user record shipped to callers of `verify_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub email_verified: bool,
}

/// Storage seam the identity service plugs into the dispatch table.
#[async_trait]
pub trait IdentityBackend: Send + Sync + 'static {
    /// Resolve an access token to its user, or reject it.
    ///
    /// Implementations reject with [`INVALID_TOKEN`] for any token that does
    /// not validate; the reason travels to the caller verbatim.
    async fn verify_token(&self, token: &str) -> Result<UserProfile, HandlerError>;

    /// Change a user's role.
    async fn update_role(&self, user_id: i64, role: &str) -> Result<(), HandlerError>;
}

/// Build the identity service's dispatch table.
pub fn dispatch_table(backend: Arc<dyn IdentityBackend>) -> DispatchTable {
    let mut table = DispatchTable::new();

    let verify_backend = Arc::clone(&backend);
    table.register("verify_token", move |request: Value| {
        let backend = Arc::clone(&verify_backend);
        async move {
            let token = payload::require_str(&request, "token")?;
            let user = backend.verify_token(&token).await?;
            payload::to_wire(&user)
        }
        .boxed()
    });

    table.register("update_role", move |request: Value| {
        let backend = Arc::clone(&backend);
        async move {
            let user_id = payload::require_i64(&request, "user_id")?;
            let role = payload::require_str(&request, "role")?;
            backend.update_role(user_id, &role).await?;
            Ok(json!({"detail": "role_updated"}))
        }
        .boxed()
    });

    table
}

/// Outcome of a token verification round trip.
///
/// `Rejected` is the service saying no; broker trouble surfaces as
/// [`RpcError`] instead, so HTTP middleware can answer 401 versus 503
/// correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid(UserProfile),
    Rejected { reason: String },
}

/// Outcome of a role update round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleUpdateOutcome {
    Applied,
    Rejected { reason: String },
}

/// Typed client for the identity service's RPC surface.
#[derive(Debug)]
pub struct IdentityClient {
    client: RpcClient,
    queue: String,
}

impl IdentityClient {
    pub async fn open(broker: &Broker, config: &RpcConfig) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::open(broker, config.client.clone()).await?,
            queue: config.queues.auth_validation.clone(),
        })
    }

    pub async fn verify_token(
        &mut self,
        token: &str,
        timeout: Duration,
    ) -> Result<VerifyOutcome, RpcError> {
        let response = self
            .client
            .call(&self.queue, "verify_token", json!({"token": token}), timeout)
            .await?;

        if response.ok {
            let user: UserProfile = payload::from_wire(response.data)?;
            Ok(VerifyOutcome::Valid(user))
        } else {
            Ok(VerifyOutcome::Rejected {
                reason: payload::failure_reason(response.error),
            })
        }
    }

    pub async fn update_role(
        &mut self,
        user_id: i64,
        role: &str,
        timeout: Duration,
    ) -> Result<RoleUpdateOutcome, RpcError> {
        let response = self
            .client
            .call(
                &self.queue,
                "update_role",
                json!({"user_id": user_id, "role": role}),
                timeout,
            )
            .await?;

        if response.ok {
            Ok(RoleUpdateOutcome::Applied)
        } else {
            Ok(RoleUpdateOutcome::Rejected {
                reason: payload::failure_reason(response.error),
            })
        }
    }

    pub async fn close(self) {
        self.client.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend;

    #[async_trait]
    impl IdentityBackend for StubBackend {
        async fn verify_token(&self, token: &str) -> Result<UserProfile, HandlerError> {
            if token == "abc" {
                Ok(UserProfile {
                    id: 42,
                    email: "ada@example.com".to_string(),
                    full_name: "Ada Lovelace".to_string(),
                    email_verified: true,
                })
            } else {
                Err(HandlerError::rejected(INVALID_TOKEN))
            }
        }

        async fn update_role(&self, user_id: i64, _role: &str) -> Result<(), HandlerError> {
            if user_id == 42 {
                Ok(())
            } else {
                Err(HandlerError::internal("user not found"))
            }
        }
    }

    #[tokio::test]
    async fn test_verify_token_resolves_user() {
        let table = dispatch_table(Arc::new(StubBackend));
        let data = table
            .dispatch("verify_token", json!({"token": "abc"}))
            .await
            .unwrap();
        assert_eq!(data["id"], 42);
        assert_eq!(data["email"], "ada@example.com");
        assert_eq!(data["email_verified"], true);
    }

    #[tokio::test]
    async fn test_verify_token_rejects_bad_token() {
        let table = dispatch_table(Arc::new(StubBackend));
        let err = table
            .dispatch("verify_token", json!({"token": "nope"}))
            .await
            .unwrap_err();
        match err {
            crate::rpc::DispatchError::Handler(e) => {
                assert_eq!(e.wire_reason(), INVALID_TOKEN);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_token_missing_token_is_invalid_payload() {
        let table = dispatch_table(Arc::new(StubBackend));
        let err = table.dispatch("verify_token", json!({})).await.unwrap_err();
        match err {
            crate::rpc::DispatchError::Handler(e) => {
                assert_eq!(e.wire_reason(), "invalid_payload");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_role() {
        let table = dispatch_table(Arc::new(StubBackend));
        let data = table
            .dispatch("update_role", json!({"user_id": 42, "role": "admin"}))
            .await
            .unwrap();
        assert_eq!(data, json!({"detail": "role_updated"}));
    }

    #[test]
    fn test_user_profile_wire_shape() {
        let user = UserProfile {
            id: 7,
            email: "u@example.com".to_string(),
            full_name: "U".to_string(),
            email_verified: false,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "email": "u@example.com",
                "full_name": "U",
                "email_verified": false,
            })
        );
    }
}
