//! # Messaging Layer
//!
//! Wire envelopes, the queue driver seam, broker drivers, and the connection
//! manager for queue-carried RPC.

pub mod broker;
pub mod driver;
pub mod envelope;
pub mod errors;
pub mod memory;
pub mod pgmq_driver;

pub use broker::Broker;
pub use driver::{QueueDriver, QueueMessage};
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use errors::{RpcError, RpcResult};
pub use memory::MemoryDriver;
pub use pgmq_driver::PgmqDriver;
