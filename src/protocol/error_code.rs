//! Error codes and error payloads shared by both ends of the channel.
//!
//! The code table is closed: both the responder and the correlator map
//! between [`ErrorCode`] and the numeric wire code through this one module,
//! so the two sides can never disagree on what a number means.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Canonical error kinds, carried on the wire as JSON-RPC 2.0 style numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ErrorCode {
    /// The call payload could not be decoded.
    ParseError,
    /// The input was decoded but is not acceptable to the procedure.
    BadRequest,
    /// Unknown or non-standard failure.
    InternalServerError,
    Unauthorized,
    Forbidden,
    /// No procedure is registered on the requested path.
    NotFound,
    /// The procedure exists but not for the requested call kind.
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
}

impl ErrorCode {
    /// Every code in the table, in wire order.
    pub const ALL: [ErrorCode; 14] = [
        ErrorCode::ParseError,
        ErrorCode::BadRequest,
        ErrorCode::InternalServerError,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::MethodNotSupported,
        ErrorCode::Timeout,
        ErrorCode::Conflict,
        ErrorCode::PreconditionFailed,
        ErrorCode::PayloadTooLarge,
        ErrorCode::UnprocessableContent,
        ErrorCode::TooManyRequests,
        ErrorCode::ClientClosedRequest,
    ];

    /// Numeric code used on the wire.
    pub const fn as_i32(self) -> i32 {
        // ---
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::BadRequest => -32600,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::PreconditionFailed => -32012,
            ErrorCode::PayloadTooLarge => -32013,
            ErrorCode::UnprocessableContent => -32022,
            ErrorCode::TooManyRequests => -32029,
            ErrorCode::ClientClosedRequest => -32099,
        }
    }

    /// Symbolic key, e.g. `"NOT_FOUND"`.
    pub const fn key(self) -> &'static str {
        // ---
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
        }
    }
}

/// Numbers outside the table decode as [`ErrorCode::InternalServerError`].
impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_i32() == value)
            .unwrap_or(ErrorCode::InternalServerError)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error payload of a failure reply: `error.{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Error raised by a procedure on the responder side.
///
/// Procedures that know which kind of failure they hit construct one with
/// that code; anything else should go through [`ProcedureError::from_unknown`],
/// which maps to [`ErrorCode::InternalServerError`]. Extra fields added with
/// [`with_data`](Self::with_data) travel to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct ProcedureError {
    code: ErrorCode,
    message: String,
    data: Map<String, Value>,
}

impl ProcedureError {
    // ---
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// Normalize an arbitrary error that carries no code of its own.
    pub fn from_unknown<E>(err: E) -> Self
    where
        E: std::error::Error,
    {
        Self::internal(err.to_string())
    }

    /// Attach an extra field forwarded in the reply's `data` object.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Build the wire payload for a failure reply on `path`.
    ///
    /// `data.code` is always the symbolic key; `data.path` is filled in unless
    /// the procedure already set it.
    pub fn into_shape(self, path: &str) -> ErrorShape {
        // ---
        let mut data = self.data;
        data.insert("code".into(), Value::from(self.code.key()));
        data.entry("path").or_insert_with(|| Value::from(path));

        ErrorShape {
            code: self.code,
            message: self.message,
            data,
        }
    }
}

/// Caller-side view of a failure reply.
///
/// Carries the same code, message and extra fields the responder sent, so the
/// caller can tell error classes apart.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} ({code})")]
pub struct ClientError {
    code: ErrorCode,
    message: String,
    data: Map<String, Value>,
}

impl ClientError {
    // ---
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Look up one extra field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl From<ErrorShape> for ClientError {
    fn from(shape: ErrorShape) -> Self {
        Self {
            code: shape.code,
            message: shape.message,
            data: shape.data,
        }
    }
}
