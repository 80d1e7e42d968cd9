//! # RPC Layer
//!
//! The shared request/reply machinery: the one-shot client, the long-running
//! consumer loop, and the dispatch table that plugs service-specific handlers
//! into both.

pub mod client;
pub mod dispatch;
pub mod server;

pub use client::RpcClient;
pub use dispatch::{DispatchError, DispatchTable, HandlerError, HandlerFuture};
pub use server::{RpcServer, ServerState, ServerStateHandle};
