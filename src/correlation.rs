use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier used to match a call with its reply.
///
/// Call ids are carried *in-band* in the `id` field of both envelopes and are
/// opaque to the channel. An id only has to be unique among the calls that
/// are still pending on one correlator; it may be reused once settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for CallId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of call ids.
#[derive(Debug)]
pub(crate) struct CallIdGenerator {
    next: AtomicU64,
}

impl CallIdGenerator {
    // ---
    pub(crate) fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Hand out the next id. Wraps around at `u64::MAX`.
    pub(crate) fn generate(&self) -> CallId {
        CallId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
