// tests/correlator.rs
//
// Correlator against a scripted worker end: the test reads the calls off the
// channel and decides which replies to send, in which order.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::timeout;

use common::{init_logging, next_call, post, RefusingCodec, TaggedCodec};
use port_rpc::{
    // ---
    memory_channel,
    CallId,
    CallKind,
    CorrelatorBuilder,
    ErrorCode,
    ErrorShape,
    ProtocolFault,
    ReplyEnvelope,
    RpcError,
};

fn success(id: u64, data: Value) -> Value {
    ReplyEnvelope::success(CallId::new(id), data).to_message().unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    // ---
    timeout(Duration::from_secs(1), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

async fn next_fault(faults: &mut tokio::sync::broadcast::Receiver<ProtocolFault>) -> ProtocolFault {
    // ---
    timeout(Duration::from_secs(1), faults.recv())
        .await
        .expect("timed out waiting for a fault")
        .expect("fault channel closed")
}

#[tokio::test]
async fn replies_out_of_order_settle_their_own_calls() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("out-of-order");
    let correlator = CorrelatorBuilder::new(caller).build();

    let call1 = correlator.issue_call_with_id(CallId::new(1), CallKind::Query, "a", json!("in-1")).unwrap();
    let call2 = correlator.issue_call_with_id(CallId::new(2), CallKind::Query, "b", json!("in-2")).unwrap();
    let call3 = correlator.issue_call_with_id(CallId::new(3), CallKind::Query, "c", json!("in-3")).unwrap();

    // Calls leave in issue order
    for expected in 1..=3 {
        let call = next_call(&mut worker).await;
        assert_eq!(call.id, CallId::new(expected));
    }
    assert_eq!(correlator.pending_calls(), 3);

    post(&worker, success(3, json!("reply-3")));
    post(&worker, success(1, json!("reply-1")));
    post(&worker, success(2, json!("reply-2")));

    assert_eq!(call3.await.unwrap(), json!("reply-3"));
    assert_eq!(call1.await.unwrap(), json!("reply-1"));
    assert_eq!(call2.await.unwrap(), json!("reply-2"));
    assert_eq!(correlator.pending_calls(), 0);
}

#[tokio::test]
async fn duplicate_reply_does_not_resettle() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("duplicate");
    let correlator = CorrelatorBuilder::new(caller).build();
    let mut faults = correlator.faults();

    let call = correlator.issue_call(CallKind::Query, "once", Value::Null).unwrap();
    let id = next_call(&mut worker).await.id;

    post(&worker, success(id.get(), json!("first")));
    post(&worker, success(id.get(), json!("second")));

    assert_eq!(call.await.unwrap(), json!("first"));
    assert_eq!(next_fault(&mut faults).await, ProtocolFault::OrphanReply(id));
    assert_eq!(correlator.pending_calls(), 0);
    assert!(correlator.is_connected());
}

#[tokio::test]
async fn orphan_reply_is_reported_and_others_survive() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("orphan");
    let correlator = CorrelatorBuilder::new(caller).build();
    let mut faults = correlator.faults();

    let call = correlator.issue_call_with_id(CallId::new(1), CallKind::Query, "kept", Value::Null).unwrap();
    let _ = next_call(&mut worker).await;

    post(&worker, success(999, json!("nobody asked")));
    assert_eq!(next_fault(&mut faults).await, ProtocolFault::OrphanReply(CallId::new(999)));
    assert_eq!(correlator.pending_calls(), 1);

    // The receive loop keeps going after the fault
    post(&worker, success(1, json!("still here")));
    assert_eq!(call.await.unwrap(), json!("still here"));
}

#[tokio::test]
async fn malformed_reply_is_reported() {
    // ---
    init_logging();

    let (caller, worker) = memory_channel("malformed");
    let correlator = CorrelatorBuilder::new(caller).build();
    let mut faults = correlator.faults();

    post(&worker, json!({ "trpc": { "id": "not-a-number", "result": {} } }));

    assert!(matches!(next_fault(&mut faults).await, ProtocolFault::MalformedReply(_)));
    assert!(correlator.is_connected());
}

#[tokio::test]
async fn malformed_reply_rejects_the_call_it_names() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("malformed-named");
    let correlator = CorrelatorBuilder::new(caller).no_call_timeout().build();
    let mut faults = correlator.faults();

    let call = correlator.issue_call(CallKind::Query, "x", Value::Null).unwrap();
    let id = next_call(&mut worker).await.id;

    // `data` must be a map
    post(
        &worker,
        json!({ "trpc": { "id": id.get(), "error": { "code": -32603, "message": "boom", "data": null } } }),
    );

    let result = timeout(Duration::from_secs(1), call).await.expect("call should not hang");
    assert!(matches!(result, Err(RpcError::InvalidMessage(_))));
    assert!(matches!(next_fault(&mut faults).await, ProtocolFault::MalformedReply(_)));
    assert_eq!(correlator.pending_calls(), 0);
    assert!(correlator.is_connected());
}

#[tokio::test]
async fn failure_reply_preserves_error_shape() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("error-shape");
    let correlator = CorrelatorBuilder::new(caller).build();

    let call = correlator.issue_call(CallKind::Mutation, "users.create", json!({})).unwrap();
    let id = next_call(&mut worker).await.id;

    let mut data = serde_json::Map::new();
    data.insert("detail".into(), json!(1));
    let reply = ReplyEnvelope::failure(
        id,
        ErrorShape {
            code: ErrorCode::Conflict,
            message: "boom".into(),
            data,
        },
    );
    post(&worker, reply.to_message().unwrap());

    match call.await {
        Err(RpcError::Remote(err)) => {
            assert_eq!(err.code(), ErrorCode::Conflict);
            assert_eq!(err.message(), "boom");
            assert_eq!(err.field("detail"), Some(&json!(1)));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn codec_failure_is_reported_before_sending() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("codec-refuses");
    let correlator = CorrelatorBuilder::new(caller).codec(Arc::new(RefusingCodec)).build();

    let result = correlator.issue_call(CallKind::Query, "anything", json!(1));

    assert!(matches!(result, Err(RpcError::Codec(_))));
    assert_eq!(correlator.pending_calls(), 0);
    assert!(worker.inbox.try_recv().is_err(), "nothing may reach the wire");
}

#[tokio::test]
async fn unserializable_typed_input_is_reported_before_sending() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("bad-input");
    let correlator = CorrelatorBuilder::new(caller).build();

    // JSON object keys must be strings
    let mut input: HashMap<(i32, i32), i32> = HashMap::new();
    input.insert((1, 2), 3);

    let result: port_rpc::Result<Value> = correlator.query("grid.lookup", input).await;

    assert!(matches!(result, Err(RpcError::Serialization(_))));
    assert_eq!(correlator.pending_calls(), 0);
    assert!(worker.inbox.try_recv().is_err());
}

#[tokio::test]
async fn codec_wraps_input_and_unwraps_output() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("tagged");
    let correlator = CorrelatorBuilder::new(caller).codec(Arc::new(TaggedCodec)).build();

    let input = json!({ "name": "ada", "tags": [1, 2, 3] });
    let call = correlator.issue_call(CallKind::Query, "users.find", input.clone()).unwrap();

    let sent = next_call(&mut worker).await;
    assert_eq!(sent.params.input, json!({ "json": input }));
    assert_eq!(sent.path(), "users.find");
    assert_eq!(sent.method, CallKind::Query);

    post(&worker, success(sent.id.get(), json!({ "json": { "found": true } })));
    assert_eq!(call.await.unwrap(), json!({ "found": true }));
}

#[tokio::test]
async fn undecodable_success_data_rejects_the_call() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("tagged-bad-reply");
    let correlator = CorrelatorBuilder::new(caller).codec(Arc::new(TaggedCodec)).build();

    let call = correlator.issue_call(CallKind::Query, "q", Value::Null).unwrap();
    let id = next_call(&mut worker).await.id;

    // Missing the codec's wrapper
    post(&worker, success(id.get(), json!(5)));

    assert!(matches!(call.await, Err(RpcError::Codec(_))));
    assert_eq!(correlator.pending_calls(), 0);
}

#[tokio::test]
async fn caller_assigned_id_must_be_unique_while_pending() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("dup-id");
    let correlator = CorrelatorBuilder::new(caller).build();

    let first = correlator.issue_call_with_id(CallId::new(1), CallKind::Query, "a", Value::Null).unwrap();
    let second = correlator.issue_call_with_id(CallId::new(1), CallKind::Query, "a", Value::Null);
    assert!(matches!(second, Err(RpcError::DuplicateCallId(id)) if id == CallId::new(1)));

    // Generated ids step over the caller-assigned one
    let generated = correlator.issue_call(CallKind::Query, "b", Value::Null).unwrap();
    assert_eq!(generated.id(), CallId::new(2));

    let _ = next_call(&mut worker).await;
    let _ = next_call(&mut worker).await;
    assert!(worker.inbox.try_recv().is_err());

    // Reuse after settlement is fine
    post(&worker, success(1, json!("done")));
    first.await.unwrap();
    let reused = correlator.issue_call_with_id(CallId::new(1), CallKind::Query, "a", Value::Null);
    assert!(reused.is_ok());
    drop(generated);
}

#[tokio::test]
async fn late_drop_of_settled_call_keeps_reused_id() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("reuse-id");
    let correlator = CorrelatorBuilder::new(caller).no_call_timeout().build();
    let mut faults = correlator.faults();

    let first = correlator.issue_call_with_id(CallId::new(5), CallKind::Query, "a", Value::Null).unwrap();
    let _ = next_call(&mut worker).await;
    post(&worker, success(5, json!("first")));
    wait_until(|| correlator.pending_calls() == 0).await;

    // The first call settled but was never awaited
    let second = correlator.issue_call_with_id(CallId::new(5), CallKind::Query, "b", Value::Null).unwrap();
    drop(first);
    assert_eq!(correlator.pending_calls(), 1);

    let _ = next_call(&mut worker).await;
    post(&worker, success(5, json!("second")));

    let result = timeout(Duration::from_secs(1), second).await.expect("call should not hang");
    assert_eq!(result.unwrap(), json!("second"));
    assert!(faults.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn call_times_out_and_late_reply_is_orphaned() {
    // ---
    init_logging();

    let (caller, mut worker) = memory_channel("timeout");
    let correlator = CorrelatorBuilder::new(caller)
        .call_timeout(Duration::from_millis(50))
        .build();
    let mut faults = correlator.faults();

    let call = correlator.issue_call(CallKind::Query, "never", Value::Null).unwrap();
    let id = call.id();

    assert!(matches!(call.await, Err(RpcError::Timeout)));
    assert_eq!(correlator.pending_calls(), 0);

    let _ = next_call(&mut worker).await;
    post(&worker, success(id.get(), json!("too late")));
    assert_eq!(next_fault(&mut faults).await, ProtocolFault::OrphanReply(id));
}

#[tokio::test]
async fn closed_channel_fails_pending_calls() {
    // ---
    init_logging();

    let (caller, worker) = memory_channel("closed");
    let correlator = CorrelatorBuilder::new(caller).no_call_timeout().build();

    let call = correlator.issue_call(CallKind::Query, "hang", Value::Null).unwrap();
    drop(worker);

    let result = timeout(Duration::from_secs(1), call).await.expect("call should not hang");
    assert!(matches!(result, Err(RpcError::ChannelClosed)));
    assert_eq!(correlator.pending_calls(), 0);
}

#[tokio::test]
async fn closed_channel_refuses_new_calls() {
    // ---
    init_logging();

    let (caller, worker) = memory_channel("closed-later");
    let correlator = CorrelatorBuilder::new(caller).no_call_timeout().build();

    // Only the worker's outbound side closes; posting to it still succeeds
    worker.outbox.close().await.unwrap();
    wait_until(|| !correlator.is_connected()).await;

    let result = correlator.issue_call(CallKind::Query, "x", Value::Null);
    assert!(matches!(result, Err(RpcError::ChannelClosed)));
    assert_eq!(correlator.pending_calls(), 0);
}

#[tokio::test]
async fn post_failure_unregisters_call() {
    // ---
    init_logging();

    let (caller, _worker) = memory_channel("post-fails");
    let correlator = CorrelatorBuilder::new(caller).build();

    correlator.close().await.unwrap();

    let result = correlator.issue_call(CallKind::Query, "x", Value::Null);
    assert!(matches!(result, Err(RpcError::Transport(_))));
    assert_eq!(correlator.pending_calls(), 0);
}
