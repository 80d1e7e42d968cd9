//! # Resilience Patterns
//!
//! Fault-tolerance building blocks for the RPC machinery.

pub mod backoff;

pub use backoff::ReconnectBackoff;
