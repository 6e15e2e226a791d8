// src/domain/port.rs

//! Channel domain abstractions.
//!
//! This module defines the message-port interface used by the correlator and
//! responder to exchange messages. It intentionally avoids any reference to a
//! concrete channel implementation.
//!
//! A port only delivers opaque structured messages between the two ends of a
//! channel. Call correlation, codecs, and timeouts are handled elsewhere.
//!
//! Concrete implementations of this interface live under `src/channel/`.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{Message, Result};

/// Sending half of one end of a bidirectional channel.
///
/// Implementations must ensure that:
/// - Messages posted from one end arrive at the other end in posting order.
/// - `post()` never waits on the receiver; it either enqueues or fails.
/// - After `close()`, further posts fail and the peer's inbox ends once the
///   queued messages are drained.
///
/// The in-memory channel serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat `close` as a normal
/// `async fn`.
#[async_trait::async_trait]
pub trait MessagePort: Send + Sync {
    // ---
    /// Identifier of this port, used for logging.
    fn port_id(&self) -> &str;

    /// Post a message to the other end of the channel.
    fn post(&self, message: Message) -> Result<()>;

    /// Close the sending half of this port.
    async fn close(&self) -> Result<()>;
}

/// Shared port pointer.
///
/// `.clone()` is cheap and every clone posts through the same underlying
/// channel end.
pub type PortPtr = Arc<dyn MessagePort>;

/// One end of a bidirectional channel.
///
/// `outbox` posts to the peer; `inbox` yields what the peer posted. The inbox
/// ends when the peer closes its outbox or drops every clone of it.
pub struct Port {
    // ---
    /// Sending half.
    pub outbox: PortPtr,

    /// Receiving half.
    pub inbox: mpsc::UnboundedReceiver<Message>,
}

impl Port {
    pub fn port_id(&self) -> &str {
        self.outbox.port_id()
    }
}

/// Stream of newly connected ports on the worker side.
///
/// Each accepted `Port` corresponds to one "connect" event: a caller context
/// attached to the worker and handed over its end of a fresh channel.
pub struct ConnectionListener {
    // ---
    incoming: mpsc::UnboundedReceiver<Port>,
}

impl ConnectionListener {
    // ---
    pub fn new(incoming: mpsc::UnboundedReceiver<Port>) -> Self {
        Self { incoming }
    }

    /// Wait for the next connection. Returns `None` once no more connections
    /// can arrive.
    pub async fn accept(&mut self) -> Option<Port> {
        self.incoming.recv().await
    }
}
