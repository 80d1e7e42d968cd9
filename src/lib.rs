#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core Rust
//!
//! Rust implementation of the queue-backed request/reply RPC core used by the
//! courier service fleet (identity, chat, task, team).
//!
//! ## Overview
//!
//! The services deploy independently and never share a database or a
//! synchronous network transport. Cross-service reads go through request/reply
//! RPC carried over durable broker queues: a caller publishes a request onto a
//! well-known queue with a correlation id and a private reply queue, then
//! blocks until a matching reply arrives or a timeout elapses. A server-side
//! consumer loop drains the well-known queue, dispatches each request to an
//! action handler, and publishes the reply to the queue the caller named.
//!
//! The broker is PGMQ (PostgreSQL message queues). Durable service queues
//! survive broker restarts and accumulate requests while no server is running;
//! acknowledgement is message deletion, and the prefetch-of-one discipline is
//! a single visibility-timeout lease held until the ack.
//!
//! ## Architecture
//!
//! - [`messaging`] - wire envelopes, the queue driver seam, and the broker
//!   connection manager
//! - [`rpc`] - the one-shot RPC client and the long-running consumer loop
//! - [`services`] - per-service dispatch tables and typed client wrappers
//! - [`resilience`] - reconnect backoff policy
//! - [`config`] - configuration structures and environment loading
//! - [`logging`] - structured logging initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::config::RpcConfig;
//! use courier_core::messaging::Broker;
//! use courier_core::services::identity::{IdentityClient, VerifyOutcome};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), courier_core::messaging::RpcError> {
//! let config = RpcConfig::from_env()?;
//! let broker = Broker::new(config.broker.clone());
//!
//! let mut client = IdentityClient::open(&broker, &config).await?;
//! match client.verify_token("token-from-header", Duration::from_secs(3)).await? {
//!     VerifyOutcome::Valid(user) => println!("authenticated: {}", user.email),
//!     VerifyOutcome::Rejected { reason } => println!("rejected: {reason}"),
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod messaging;
pub mod resilience;
pub mod rpc;
pub mod services;

pub use config::{BrokerConfig, ClientConfig, ConnectionPolicy, QueueConfig, RpcConfig, ServerConfig};
pub use messaging::{
    Broker, MemoryDriver, PgmqDriver, QueueDriver, QueueMessage, RequestEnvelope, ResponseEnvelope,
    RpcError, RpcResult,
};
pub use rpc::{DispatchTable, HandlerError, RpcClient, RpcServer, ServerState};
