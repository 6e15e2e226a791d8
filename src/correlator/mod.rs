// src/correlator/mod.rs
//! Caller-side call correlation.
//!
//! This module contains the [`Correlator`], which sends calls over a port and
//! routes each incoming reply back to the caller awaiting it.
//!
//! # Architecture
//!
//! Each call gets a call id and a oneshot channel registered in the pending
//! table *before* the call message is posted. A background receive task reads
//! the port's inbox, decodes each reply, removes the matching entry and hands
//! the outcome to the waiting [`PendingCall`]. Replies may arrive in any order;
//! only the id decides which caller is settled.
//!
//! Replies that match no pending call are protocol faults. They are logged and
//! broadcast through [`Correlator::faults`], and the receive task carries on
//! with the next message. A reply that cannot be decoded is a fault as well;
//! if its id still names a pending call, that call is rejected with
//! `RpcError::InvalidMessage`.
//!
//! Once the worker end closes, every pending call fails with
//! `RpcError::ChannelClosed` and new calls are refused with the same error.
//!
//! # Concurrency
//!
//! Calls may be issued from any task. The pending table is protected by a
//! mutex that is never held across an `.await`.

mod pending;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::correlation::CallIdGenerator;
use crate::lock::lock_ignore_poison;
use crate::protocol::peek_id;
use crate::registry::BoxFuture;
use crate::{
    // ---
    log_debug,
    log_error,
    log_warn,
    CallEnvelope,
    CallId,
    CallKind,
    ClientError,
    Codec,
    CodecPtr,
    CorrelatorConfig,
    Message,
    Outcome,
    Port,
    PortPtr,
    ReplyEnvelope,
    Result,
    RpcError,
};
use pending::{PendingTable, Ticket};

/// A reply the correlator could not route.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolFault {
    /// No pending call has this id: a duplicate, late or foreign reply.
    OrphanReply(CallId),
    /// The message is not a reply envelope.
    MalformedReply(String),
}

/// Caller-side end of the RPC link.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
    rx_task: Arc<JoinHandle<()>>,
}

struct Inner {
    // ---
    outbox: PortPtr,
    codec: CodecPtr,
    config: CorrelatorConfig,
    ids: CallIdGenerator,
    pending: Mutex<PendingTable>,
    faults: broadcast::Sender<ProtocolFault>,
}

impl Correlator {
    // ---
    /// Create a correlator with the identity codec and default configuration.
    ///
    /// Must be called from within a tokio runtime; the receive task is
    /// spawned immediately.
    pub fn new(port: Port) -> Self {
        Self::with_config(port, crate::codec::default_codec(), CorrelatorConfig::default())
    }

    /// Create a correlator with an explicit codec and configuration.
    pub fn with_config(port: Port, codec: CodecPtr, config: CorrelatorConfig) -> Self {
        // ---
        let Port { outbox, inbox } = port;
        let (faults, _) = broadcast::channel(config.fault_capacity.max(1));

        let inner = Arc::new(Inner {
            outbox,
            ids: CallIdGenerator::starting_at(config.first_call_id),
            codec,
            config,
            pending: Mutex::new(PendingTable::new()),
            faults,
        });

        let rx_task = tokio::spawn(receive_loop(Arc::downgrade(&inner), inbox));

        Self {
            inner,
            rx_task: Arc::new(rx_task),
        }
    }

    /// Issue a call with a freshly generated id.
    ///
    /// The input is run through the codec and the call is posted before this
    /// returns. The returned [`PendingCall`] resolves with the
    /// codec-deserialized reply data.
    ///
    /// # Errors
    ///
    /// Fails without sending anything if:
    /// - `RpcError::Codec` - the codec rejects the input
    /// - `RpcError::Serialization` - the call envelope cannot be built
    /// - `RpcError::Transport` - the port refuses the message
    /// - `RpcError::ChannelClosed` - the worker end has already closed
    pub fn issue_call(&self, kind: CallKind, path: &str, input: Value) -> Result<PendingCall> {
        // ---
        let input = self.inner.codec.serialize(input)?;

        let (id, ticket) = {
            let mut pending = lock_ignore_poison(&self.inner.pending);

            // Skip ids a caller-assigned call still holds
            let id = loop {
                let id = self.inner.ids.generate();
                if !pending.contains(&id) {
                    break id;
                }
            };
            (id, pending.register(id)?)
        };

        self.dispatch(id, kind, path, input, ticket)
    }

    /// Issue a call under a caller-assigned id.
    ///
    /// # Errors
    ///
    /// As [`issue_call`](Self::issue_call), plus `RpcError::DuplicateCallId`
    /// if `id` belongs to a call that has not settled yet.
    pub fn issue_call_with_id(&self, id: CallId, kind: CallKind, path: &str, input: Value) -> Result<PendingCall> {
        // ---
        let input = self.inner.codec.serialize(input)?;
        let ticket = lock_ignore_poison(&self.inner.pending).register(id)?;

        self.dispatch(id, kind, path, input, ticket)
    }

    /// Typed call: serialize `input` with serde, await the reply, and decode it
    /// as `TResp`.
    ///
    /// # Errors
    ///
    /// - `RpcError::Serialization` - input or output does not fit the types
    /// - `RpcError::Remote` - the procedure failed; inspect the `ClientError`
    /// - `RpcError::Timeout` - no reply within the configured call timeout
    /// - `RpcError::ChannelClosed` - the worker end went away
    pub async fn request<TReq, TResp>(&self, kind: CallKind, path: &str, input: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let input = serde_json::to_value(input)?;
        let output = self.issue_call(kind, path, input)?.await?;
        Ok(serde_json::from_value(output)?)
    }

    /// Typed query call.
    pub async fn query<TReq, TResp>(&self, path: &str, input: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        self.request(CallKind::Query, path, input).await
    }

    /// Typed mutation call.
    pub async fn mutation<TReq, TResp>(&self, path: &str, input: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        self.request(CallKind::Mutation, path, input).await
    }

    /// Subscribe to protocol faults seen by the receive task.
    pub fn faults(&self) -> broadcast::Receiver<ProtocolFault> {
        self.inner.faults.subscribe()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    pub fn port_id(&self) -> &str {
        self.inner.outbox.port_id()
    }

    /// Whether the receive task is still reading replies.
    pub fn is_connected(&self) -> bool {
        !self.rx_task.is_finished()
    }

    /// Close the outbound side of the port.
    ///
    /// Calls already sent may still be answered.
    pub async fn close(&self) -> Result<()> {
        self.inner.outbox.close().await
    }

    fn dispatch(
        &self,
        id: CallId,
        kind: CallKind,
        path: &str,
        input: Value,
        ticket: Ticket,
    ) -> Result<PendingCall> {
        // ---
        let call = CallEnvelope::new(id, kind, path, input);

        // Entry is already registered; undo it if nothing went out
        if let Err(err) = call.to_message().and_then(|message| self.inner.outbox.post(message)) {
            lock_ignore_poison(&self.inner.pending).remove(&id, ticket.token);
            return Err(err);
        }

        log_debug!("{}: sent {kind} \"{path}\" as call {id}", self.port_id());

        Ok(PendingCall::new(id, self.inner.clone(), ticket))
    }
}

impl Inner {
    // ---
    fn handle_message(&self, message: Message) -> Result<()> {
        // ---
        let claimed_id = peek_id(&message);

        let reply = match ReplyEnvelope::from_message(message) {
            Ok(reply) => reply,
            Err(err) => {
                self.report(ProtocolFault::MalformedReply(err.to_string()));

                // A call still waiting under the claimed id is rejected
                if let Some(id) = claimed_id {
                    let reason = RpcError::InvalidMessage(format!("reply for call {id} is malformed: {err}"));
                    if lock_ignore_poison(&self.pending).reject(id, reason).is_ok() {
                        log_warn!("call {id} rejected: malformed reply");
                    }
                }
                return Err(err);
            }
        };

        let id = reply.id;
        let settled = lock_ignore_poison(&self.pending).settle(id, reply.outcome);

        if settled.is_err() {
            self.report(ProtocolFault::OrphanReply(id));
        }
        settled
    }

    fn report(&self, fault: ProtocolFault) {
        // No subscribers is fine; the fault is logged either way
        let _ = self.faults.send(fault);
    }
}

async fn receive_loop(inner: Weak<Inner>, mut inbox: tokio::sync::mpsc::UnboundedReceiver<Message>) {
    // ---
    while let Some(message) = inbox.recv().await {
        let Some(inner) = inner.upgrade() else {
            // Correlator and every pending call are gone
            return;
        };

        if let Err(err) = inner.handle_message(message) {
            log_error!("{}: reply handling error: {err}", inner.outbox.port_id());
        }
    }

    // Worker end closed: nothing pending can settle anymore
    if let Some(inner) = inner.upgrade() {
        let _failed = lock_ignore_poison(&inner.pending).fail_all();
        log_debug!(
            "{}: inbox closed, {_failed} pending calls failed",
            inner.outbox.port_id()
        );
    }
}

/// Removes the pending entry if the call stops being awaited before it
/// settles (timeout, or the `PendingCall` was dropped).
///
/// The guard only ever removes its own registration, so a settled call that
/// is dropped late cannot take out a newer call reusing the same id.
struct AbandonGuard {
    inner: Arc<Inner>,
    id: CallId,
    token: u64,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed && lock_ignore_poison(&self.inner.pending).remove(&self.id, self.token) {
            log_debug!("call {} abandoned before its reply arrived", self.id);
        }
    }
}

/// Future of one issued call.
///
/// Resolves with the codec-deserialized reply data, or rejects with the
/// remote [`ClientError`] (as `RpcError::Remote`), a codec error, a timeout,
/// or `ChannelClosed`. Dropping it abandons the call: the procedure still runs
/// on the worker, but its reply will be reported as an orphan.
#[must_use = "dropping a PendingCall abandons the call"]
pub struct PendingCall {
    id: CallId,
    fut: BoxFuture<'static, Result<Value>>,
}

impl PendingCall {
    // ---
    fn new(id: CallId, inner: Arc<Inner>, ticket: Ticket) -> Self {
        // ---
        let Ticket { token, rx } = ticket;

        // The guard is created outside the async block so that dropping a
        // never-polled PendingCall still cleans up
        let mut guard = AbandonGuard {
            inner,
            id,
            token,
            armed: true,
        };

        let fut = Box::pin(async move {
            let received = match guard.inner.config.call_timeout {
                Some(limit) => match time::timeout(limit, rx).await {
                    Ok(received) => received,
                    Err(_) => {
                        log_warn!("call {id} timed out after {limit:?}");
                        return Err(RpcError::Timeout);
                    }
                },
                None => rx.await,
            };
            guard.armed = false;

            let outcome = received.map_err(|_| RpcError::ChannelClosed)??;
            settle(guard.inner.codec.as_ref(), outcome)
        });

        Self { id, fut }
    }

    /// Id this call was sent under.
    pub fn id(&self) -> CallId {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.fut.as_mut().poll(cx)
    }
}

/// Apply the codec to a delivered outcome.
fn settle(codec: &dyn Codec, outcome: Outcome) -> Result<Value> {
    // ---
    match outcome {
        Outcome::Success(body) => Ok(codec.deserialize(body.data)?),
        Outcome::Failure(shape) => Err(RpcError::Remote(ClientError::from(shape))),
    }
}
