use crate::{log_debug, CallId, Outcome, Result, RpcError};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// What a waiting call receives: the reply's outcome, or the reason the reply
/// could not be used.
pub(super) type Delivery = Result<Outcome>;

/// Handle returned for each registration.
///
/// The token tells this registration apart from a later one that reuses the
/// same call id.
pub(super) struct Ticket {
    pub token: u64,
    pub rx: oneshot::Receiver<Delivery>,
}

struct Entry {
    token: u64,
    tx: oneshot::Sender<Delivery>,
}

/// Tracks calls waiting for their reply
///
/// Maps call ids to oneshot channels. When a reply arrives, the entry is
/// removed first and the outcome is then delivered through the channel, so
/// a second reply for the same id finds nothing to settle.
///
/// Once [`fail_all`](Self::fail_all) has run the table is closed and refuses
/// new registrations.
pub(super) struct PendingTable {
    // ---
    calls: HashMap<CallId, Entry>,
    next_token: u64,
    closed: bool,
}

impl PendingTable {
    // ---

    /// Create a new empty pending table
    pub fn new() -> Self {
        // ---
        Self {
            calls: HashMap::new(),
            next_token: 0,
            closed: false,
        }
    }

    /// Register a new pending call
    ///
    /// Returns a ticket whose receiver will be notified when the reply
    /// arrives, `DuplicateCallId` if the id is still pending, or
    /// `ChannelClosed` once the table is closed.
    pub fn register(&mut self, id: CallId) -> Result<Ticket> {
        // ---
        if self.closed {
            return Err(RpcError::ChannelClosed);
        }
        if self.calls.contains_key(&id) {
            return Err(RpcError::DuplicateCallId(id));
        }

        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        self.calls.insert(id, Entry { token, tx });
        Ok(Ticket { token, rx })
    }

    /// Settle a pending call with its outcome
    ///
    /// Returns `OrphanReply` if no call with this id is pending; the table is
    /// left untouched in that case.
    pub fn settle(&mut self, id: CallId, outcome: Outcome) -> Result<()> {
        self.deliver(id, Ok(outcome))
    }

    /// Settle a pending call with an error instead of an outcome
    pub fn reject(&mut self, id: CallId, err: RpcError) -> Result<()> {
        self.deliver(id, Err(err))
    }

    fn deliver(&mut self, id: CallId, delivery: Delivery) -> Result<()> {
        // ---
        let entry = self.calls.remove(&id).ok_or(RpcError::OrphanReply(id))?;

        if entry.tx.send(delivery).is_err() {
            log_debug!("reply for call {id} arrived after the caller stopped waiting");
        }
        Ok(())
    }

    /// Remove a pending call without delivering an outcome
    ///
    /// Only the registration identified by `token` is removed; a newer call
    /// that reused the id is left alone. Used for timeout, abandonment and
    /// send-failure cleanup.
    pub fn remove(&mut self, id: &CallId, token: u64) -> bool {
        // ---
        match self.calls.get(id) {
            Some(entry) if entry.token == token => self.calls.remove(id).is_some(),
            _ => false,
        }
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.calls.contains_key(id)
    }

    /// Drop every pending call and close the table. Waiting callers observe a
    /// closed channel.
    pub fn fail_all(&mut self) -> usize {
        // ---
        self.closed = true;

        let count = self.calls.len();
        self.calls.clear();
        count
    }

    /// Get the number of pending calls
    pub fn len(&self) -> usize {
        // ---
        self.calls.len()
    }
}
