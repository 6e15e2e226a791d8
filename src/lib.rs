//! RPC over a bidirectional message port with request/response correlation
//!
//! This library connects a caller running in one execution context with a
//! procedure registry running in another (typically a background worker),
//! using nothing but message passing between them.
//!
//! - The [`Correlator`] runs on the caller side. It posts call envelopes and
//!   matches each reply to the caller awaiting it by call id, whatever order
//!   replies arrive in.
//! - The [`Responder`] runs on the worker side. It accepts connections,
//!   resolves each call's dotted path in a [`ProcedureRegistry`], invokes the
//!   procedure and posts back exactly one reply per call.
//!
//! Payloads pass through an injected [`Codec`] on both sides; failures travel
//! as `{ code, message, data }` using the shared [`ErrorCode`] table.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use port_rpc::{memory_worker, CallContext, Correlator, ProcedureError, ProcedureRegistry, Responder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> port_rpc::Result<()> {
//! let registry = ProcedureRegistry::builder()
//!     .query("math.double", |_ctx: CallContext, n: i64| async move { Ok::<_, ProcedureError>(n * 2) })
//!     .build()?;
//!
//! let (worker, listener) = memory_worker("math");
//! let _server = Responder::new(Arc::new(registry)).listen(listener);
//!
//! let client = Correlator::new(worker.connect()?);
//! let doubled: i64 = client.query("math.double", 21).await?;
//! assert_eq!(doubled, 42);
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod builder;
mod channel;
mod codec;
mod config;
mod correlation;
mod correlator;
mod domain;
mod error;
mod lock;
mod protocol;
mod registry;
mod responder;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use correlator::{Correlator, PendingCall, ProtocolFault};
pub use responder::Responder;

pub use builder::{CorrelatorBuilder, ResponderBuilder};
pub use config::CorrelatorConfig;

pub use codec::{Codec, CodecError, CodecPtr, IdentityCodec};
pub use correlation::CallId;
pub use error::{Result, RpcError};

pub use registry::{CallContext, Procedure, ProcedureRegistry, RegistryBuilder};

pub use channel::{memory_channel, memory_worker, WorkerHandle};

// --- public re-exports
pub use domain::{
    //
    ConnectionListener,
    MessagePort,
    Port,
    PortPtr,
};

pub use protocol::{
    //
    CallEnvelope,
    CallKind,
    CallParams,
    ClientError,
    ErrorCode,
    ErrorShape,
    Message,
    Outcome,
    ProcedureError,
    ReplyEnvelope,
    ResultType,
    SuccessBody,
};
