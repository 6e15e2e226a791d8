//! Wire protocol shared by the correlator and the responder
//!
//! This module defines the call and reply envelopes exchanged over a port
//! and the closed error-code table both sides use.
mod error_code;
mod message;

pub use error_code::{ClientError, ErrorCode, ErrorShape, ProcedureError};
pub(crate) use message::peek_id;
pub use message::{
    //
    CallEnvelope,
    CallKind,
    CallParams,
    Message,
    Outcome,
    ReplyEnvelope,
    ResultType,
    SuccessBody,
};
