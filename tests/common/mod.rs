// tests/common/mod.rs
//
// Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;

use port_rpc::{
    // ---
    CallContext,
    CallEnvelope,
    Codec,
    CodecError,
    ErrorCode,
    Message,
    Port,
    ProcedureError,
    ProcedureRegistry,
    ReplyEnvelope,
};

static INIT: Once = Once::new();

pub fn init_logging() {
    // ---
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddRequest {
    pub a: i32,
    pub b: i32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AddResponse {
    pub sum: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlowRequest {
    pub delay_ms: u64,
    pub value: String,
}

/// Registry used across the tests:
///
/// - `math.add`, `math.slow`: queries that succeed
/// - `counter.increment`: mutation over shared state
/// - `fail.boom`, `fail.unknown`, `fail.panic`: the three ways a procedure fails
pub fn test_registry() -> ProcedureRegistry {
    // ---
    let counter = Arc::new(AtomicU64::new(0));

    let math = ProcedureRegistry::builder()
        .query("add", |_ctx: CallContext, req: AddRequest| async move {
            Ok(AddResponse { sum: req.a + req.b })
        })
        .query("slow", |_ctx: CallContext, req: SlowRequest| async move {
            tokio::time::sleep(Duration::from_millis(req.delay_ms)).await;
            Ok(req.value)
        });

    let fail = ProcedureRegistry::builder()
        .query("boom", |_ctx: CallContext, _: Value| async move {
            Err::<Value, _>(ProcedureError::new(ErrorCode::Conflict, "boom").with_data("detail", 1))
        })
        .query("unknown", |_ctx: CallContext, _: Value| async move {
            let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
            Err::<Value, _>(ProcedureError::from_unknown(io))
        })
        .query("panic", |_ctx: CallContext, _: Value| async move {
            if true {
                panic!("kaboom");
            }
            Ok(Value::Null)
        });

    ProcedureRegistry::builder()
        .merge("math", math)
        .merge("fail", fail)
        .mutation("counter.increment", move |_ctx: CallContext, by: u64| {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(by, Ordering::SeqCst) + by) }
        })
        .build()
        .expect("test registry is valid")
}

/// Codec that wraps every payload as `{ "json": <value> }` on the wire and
/// refuses anything not wrapped that way.
pub struct TaggedCodec;

impl Codec for TaggedCodec {
    fn serialize(&self, value: Value) -> Result<Value, CodecError> {
        Ok(json!({ "json": value }))
    }

    fn deserialize(&self, value: Value) -> Result<Value, CodecError> {
        match value {
            Value::Object(mut map) => map
                .remove("json")
                .ok_or_else(|| CodecError::new("missing \"json\" wrapper")),
            other => Err(CodecError::new(format!("expected an object, got {other}"))),
        }
    }
}

/// Codec whose serialize always fails.
pub struct RefusingCodec;

impl Codec for RefusingCodec {
    fn serialize(&self, _value: Value) -> Result<Value, CodecError> {
        Err(CodecError::new("refused"))
    }

    fn deserialize(&self, value: Value) -> Result<Value, CodecError> {
        Ok(value)
    }
}

/// Receive the next message on a port, failing the test after one second.
pub async fn next_message(port: &mut Port) -> Message {
    // ---
    timeout(Duration::from_secs(1), port.inbox.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("port closed unexpectedly")
}

pub async fn next_call(port: &mut Port) -> CallEnvelope {
    CallEnvelope::from_message(next_message(port).await).expect("valid call envelope")
}

pub async fn next_reply(port: &mut Port) -> ReplyEnvelope {
    ReplyEnvelope::from_message(next_message(port).await).expect("valid reply envelope")
}

pub fn post(port: &Port, message: Message) {
    port.outbox.post(message).expect("post failed");
}

/// Assert nothing further arrives on the port for a short while.
pub async fn assert_quiet(port: &mut Port) {
    // ---
    let extra = timeout(Duration::from_millis(50), port.inbox.recv()).await;
    assert!(extra.is_err(), "unexpected extra message: {extra:?}");
}
