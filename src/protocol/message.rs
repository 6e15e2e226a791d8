use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::protocol::ErrorShape;
use crate::{CallId, Result, RpcError};

/// A structured message as it travels over a port.
pub type Message = Value;

/// Every envelope travels wrapped as `{ "trpc": <envelope> }`.
#[derive(Serialize, Deserialize)]
struct Wire<T> {
    trpc: T,
}

fn wrap<T: Serialize>(envelope: &T) -> Result<Message> {
    Ok(serde_json::to_value(Wire { trpc: envelope })?)
}

/// Kind of procedure a call targets, carried in the `method` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::Query => "query",
            CallKind::Mutation => "mutation",
            CallKind::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    /// Dot-delimited procedure path, e.g. `"math.add"`.
    pub path: String,
    /// Codec-serialized input. An absent input decodes as `null`.
    #[serde(default)]
    pub input: Value,
}

/// Outbound call: `{ id, method, params: { path, input } }`.
///
/// Posted as `{ "trpc": { id, method, params } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub id: CallId,
    pub method: CallKind,
    pub params: CallParams,
}

impl CallEnvelope {
    // ---
    pub fn new(id: CallId, method: CallKind, path: impl Into<String>, input: Value) -> Self {
        Self {
            id,
            method,
            params: CallParams {
                path: path.into(),
                input,
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.params.path
    }

    pub fn to_message(&self) -> Result<Message> {
        wrap(self)
    }

    pub fn from_message(message: Message) -> Result<Self> {
        serde_json::from_value::<Wire<Self>>(message)
            .map(|wire| wire.trpc)
            .map_err(|err| RpcError::InvalidMessage(format!("not a call envelope: {err}")))
    }
}

/// Marker for the `result.type` field. Only `"data"` is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    #[default]
    Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody {
    #[serde(rename = "type", default)]
    pub kind: ResultType,
    #[serde(default)]
    pub data: Value,
}

/// Terminal outcome of one call.
///
/// Flattened into the reply so that it appears on the wire as either a
/// `result` or an `error` key next to `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "result")]
    Success(SuccessBody),
    #[serde(rename = "error")]
    Failure(ErrorShape),
}

/// Inbound reply: `{ id, result: { type, data } }` or `{ id, error: { code, message, data } }`,
/// wrapped in `trpc` like calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub id: CallId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ReplyEnvelope {
    // ---
    pub fn success(id: CallId, data: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Success(SuccessBody {
                kind: ResultType::Data,
                data,
            }),
        }
    }

    pub fn failure(id: CallId, error: ErrorShape) -> Self {
        Self {
            id,
            outcome: Outcome::Failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn to_message(&self) -> Result<Message> {
        wrap(self)
    }

    pub fn from_message(message: Message) -> Result<Self> {
        serde_json::from_value::<Wire<Self>>(message)
            .map(|wire| wire.trpc)
            .map_err(|err| RpcError::InvalidMessage(format!("not a reply envelope: {err}")))
    }
}

/// Best-effort recovery of the `id` field from a message that failed to decode.
pub(crate) fn peek_id(message: &Message) -> Option<CallId> {
    message
        .get("trpc")
        .and_then(|envelope| envelope.get("id"))
        .and_then(Value::as_u64)
        .map(CallId::new)
}
