//! Fluent builders for both ends of the link.
//!
//! The builders inject the collaborators explicitly (port, registry, codec)
//! so either side can be wired to test doubles without a real worker.

use std::sync::Arc;
use std::time::Duration;

use crate::{CodecPtr, Correlator, CorrelatorConfig, Port, ProcedureRegistry, Responder};

/// Builder for a [`Correlator`].
///
/// # Example
///
/// ```no_run
/// use port_rpc::{memory_worker, CorrelatorBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> port_rpc::Result<()> {
/// let (worker, _listener) = memory_worker("api");
///
/// let correlator = CorrelatorBuilder::new(worker.connect()?)
///     .call_timeout(Duration::from_secs(5))
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct CorrelatorBuilder {
    // ---
    port: Port,
    codec: Option<CodecPtr>,
    config: CorrelatorConfig,
}

impl CorrelatorBuilder {
    // ---
    pub fn new(port: Port) -> Self {
        Self {
            port,
            codec: None,
            config: CorrelatorConfig::default(),
        }
    }

    /// Set the payload codec.
    ///
    /// Default: identity codec.
    pub fn codec(mut self, codec: CodecPtr) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the per-call timeout.
    ///
    /// Default: 30s.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    /// Let calls wait for their reply indefinitely.
    pub fn no_call_timeout(mut self) -> Self {
        self.config.call_timeout = None;
        self
    }

    /// Set the first id handed out by the call id counter.
    ///
    /// Default: 1.
    pub fn first_call_id(mut self, id: u64) -> Self {
        self.config.first_call_id = id;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the correlator (consumes self). Spawns the receive task, so this
    /// must run inside a tokio runtime.
    pub fn build(self) -> Correlator {
        // ---
        let codec = self.codec.unwrap_or_else(crate::codec::default_codec);
        Correlator::with_config(self.port, codec, self.config)
    }
}

/// Builder for a [`Responder`].
pub struct ResponderBuilder {
    // ---
    registry: Arc<ProcedureRegistry>,
    codec: Option<CodecPtr>,
}

impl ResponderBuilder {
    // ---
    pub fn new(registry: impl Into<Arc<ProcedureRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            codec: None,
        }
    }

    /// Set the payload codec.
    ///
    /// Default: identity codec.
    pub fn codec(mut self, codec: CodecPtr) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn build(self) -> Responder {
        // ---
        let codec = self.codec.unwrap_or_else(crate::codec::default_codec);
        Responder::with_codec(self.registry, codec)
    }
}
