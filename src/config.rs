//! Correlator configuration.
//!
//! This type contains no channel-specific concepts. The responder has no
//! tunables beyond its registry and codec, which the builder takes directly.

use std::time::Duration;

/// Settings for a [`Correlator`](crate::Correlator).
///
/// # Example
///
/// ```
/// use port_rpc::CorrelatorConfig;
/// use std::time::Duration;
///
/// let config = CorrelatorConfig::default().with_call_timeout(Duration::from_secs(5));
/// assert_eq!(config.call_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    // ---
    /// How long a call waits for its reply before failing with
    /// `RpcError::Timeout`. `None` waits indefinitely.
    ///
    /// Default: 30 seconds
    pub call_timeout: Option<Duration>,

    /// First id handed out by the call id counter.
    ///
    /// Default: 1
    pub first_call_id: u64,

    /// Buffer size of the protocol fault broadcast channel. Slow fault
    /// subscribers lose the oldest faults beyond this.
    ///
    /// Default: 64
    pub fault_capacity: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
            first_call_id: 1,
            fault_capacity: 64,
        }
    }
}

impl CorrelatorConfig {
    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Wait for replies indefinitely.
    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }
}
