//! # Service Surfaces
//!
//! The per-service pieces of the protocol: a backend trait for the owning
//! service's storage, a dispatch-table builder, and a typed client wrapper
//! for the services that call in. Everything else in the crate is shared
//! machinery; these modules are the seam where domain logic plugs in.

pub mod identity;
pub mod task;
pub mod team;

pub(crate) mod payload;
