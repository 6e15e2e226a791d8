//! Channel implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `MessagePort` trait, exposed only through constructor functions.
//!
//! Domain code must not depend on channel-specific types.

mod memory;

pub use memory::{memory_channel, memory_worker, WorkerHandle};
