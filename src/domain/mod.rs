//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! channel implementations or codecs.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod port;

// --- Channel domain re-exports ---

pub use port::{
    //
    ConnectionListener,
    MessagePort,
    Port,
    PortPtr,
};
