//! Payload codec.
//!
//! The codec is an injected pair of pure functions applied to call inputs and
//! reply data on both ends of the channel. Both ends must be built with
//! compatible codecs: whatever `serialize` produces on one side is fed to
//! `deserialize` on the other.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A codec rejected a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CodecError(String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Serialize/deserialize pair applied to payloads.
///
/// Implementations must be pure: the same value always yields the same
/// output, and `deserialize(serialize(v)) == v` for every value the codec can
/// represent.
pub trait Codec: Send + Sync {
    /// Turn a raw value into its on-the-wire form.
    fn serialize(&self, value: Value) -> Result<Value, CodecError>;

    /// Turn an on-the-wire value back into a raw value.
    fn deserialize(&self, value: Value) -> Result<Value, CodecError>;
}

/// Shared codec pointer.
pub type CodecPtr = Arc<dyn Codec>;

/// Codec that passes values through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn serialize(&self, value: Value) -> Result<Value, CodecError> {
        Ok(value)
    }

    fn deserialize(&self, value: Value) -> Result<Value, CodecError> {
        Ok(value)
    }
}

pub(crate) fn default_codec() -> CodecPtr {
    Arc::new(IdentityCodec)
}
