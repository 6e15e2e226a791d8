//! In-memory channel implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `MessagePort` trait, plus a worker stand-in that hands out connections.
//! It is intended for tests, for running both contexts inside one process,
//! and as the reference for port semantics.
//!
//! ## Reference Semantics
//!
//! - Messages posted on one end arrive on the other end in posting order.
//! - `post()` never blocks; queues are unbounded.
//! - Closing an end, or dropping every clone of its outbox, ends the peer's
//!   inbox after the queued messages are drained.
//! - No messages are dropped due to timing or scheduling.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::lock::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    ConnectionListener,
    Message,
    MessagePort,
    Port,
    Result,
    RpcError,
};

/// In-memory port.
///
/// The sender slot is emptied on `close()`, which drops the sender and lets
/// the peer's inbox observe the end of the stream.
struct MemoryPort {
    // ---
    port_id: String,
    peer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

#[async_trait::async_trait]
impl MessagePort for MemoryPort {
    // ---
    fn port_id(&self) -> &str {
        &self.port_id
    }

    fn post(&self, message: Message) -> Result<()> {
        // ---
        let peer = lock_ignore_poison(&self.peer);

        match peer.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| RpcError::Transport(format!("{}: peer end is gone", self.port_id))),
            None => Err(RpcError::Transport(format!("{}: port is closed", self.port_id))),
        }
    }

    async fn close(&self) -> Result<()> {
        // ---
        log_debug!("{}: closing port", self.port_id);

        lock_ignore_poison(&self.peer).take();
        Ok(())
    }
}

/// Create both ends of an in-memory channel.
///
/// The returned ports are named `{label}#0` and `{label}#1`.
pub fn memory_channel(label: impl AsRef<str>) -> (Port, Port) {
    // ---
    let label = label.as_ref();

    let (tx_to_1, rx_at_1) = mpsc::unbounded_channel();
    let (tx_to_0, rx_at_0) = mpsc::unbounded_channel();

    let end0 = Port {
        outbox: Arc::new(MemoryPort {
            port_id: format!("{label}#0"),
            peer: Mutex::new(Some(tx_to_1)),
        }),
        inbox: rx_at_0,
    };

    let end1 = Port {
        outbox: Arc::new(MemoryPort {
            port_id: format!("{label}#1"),
            peer: Mutex::new(Some(tx_to_0)),
        }),
        inbox: rx_at_1,
    };

    (end0, end1)
}

/// Caller-side handle to an in-process worker.
///
/// Each [`connect`](Self::connect) opens a fresh channel, delivers the worker
/// end to the worker's [`ConnectionListener`], and returns the caller end.
#[derive(Clone)]
pub struct WorkerHandle {
    // ---
    name: Arc<str>,
    connections: mpsc::UnboundedSender<Port>,
}

impl WorkerHandle {
    // ---
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach to the worker.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the worker dropped its listener.
    pub fn connect(&self) -> Result<Port> {
        // ---
        let connection_id = Uuid::new_v4();
        let (caller_end, worker_end) = memory_channel(format!("{}/{connection_id}", self.name));

        self.connections
            .send(worker_end)
            .map_err(|_| RpcError::Transport(format!("{}: worker is not listening", self.name)))?;

        log_debug!("{}: connection {connection_id} opened", self.name);
        Ok(caller_end)
    }
}

/// Create an in-process worker: a handle callers connect through and the
/// listener the worker accepts connections from.
pub fn memory_worker(name: impl Into<String>) -> (WorkerHandle, ConnectionListener) {
    // ---
    let name: String = name.into();
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = WorkerHandle {
        name: Arc::from(name),
        connections: tx,
    };

    (handle, ConnectionListener::new(rx))
}
