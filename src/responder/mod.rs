//! Worker-side call handling
//!
//! The [`Responder`] accepts connections, reads call envelopes from each
//! connection's port, runs the addressed procedure and posts exactly one
//! reply per call back on the same port.
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::protocol::peek_id;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    CallContext,
    CallEnvelope,
    CallKind,
    CodecPtr,
    ConnectionListener,
    ErrorCode,
    Message,
    Port,
    PortPtr,
    ProcedureError,
    ProcedureRegistry,
    ReplyEnvelope,
};

/// Serves a [`ProcedureRegistry`] over message ports.
///
/// Cheap to clone; clones share the registry and codec.
///
/// # Handler Execution
///
/// - Messages from one connection are read in arrival order
/// - Each call runs on its own task, so slow procedures do not hold up
///   later calls and replies may leave out of order
/// - Every failure, including a panic inside a procedure, becomes a failure
///   reply carrying the call's id
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use port_rpc::{memory_worker, CallContext, ProcedureError, ProcedureRegistry, Responder};
///
/// # async fn example() -> port_rpc::Result<()> {
/// let registry = ProcedureRegistry::builder()
///     .query("ping", |_ctx: CallContext, _: ()| async move { Ok::<_, ProcedureError>("pong") })
///     .build()?;
///
/// let (worker, listener) = memory_worker("api");
/// let _server = Responder::new(Arc::new(registry)).listen(listener);
/// # let _ = worker;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Responder {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ProcedureRegistry>,
    codec: CodecPtr,
}

impl Responder {
    // ---
    /// Create a responder with the identity codec.
    pub fn new(registry: Arc<ProcedureRegistry>) -> Self {
        Self::with_codec(registry, crate::codec::default_codec())
    }

    pub fn with_codec(registry: Arc<ProcedureRegistry>, codec: CodecPtr) -> Self {
        Self {
            inner: Arc::new(Inner { registry, codec }),
        }
    }

    pub fn registry(&self) -> &ProcedureRegistry {
        &self.inner.registry
    }

    /// Accept connections until the listener ends, serving each one on its
    /// own task.
    pub fn listen(&self, mut listener: ConnectionListener) -> JoinHandle<()> {
        // ---
        let responder = self.clone();

        tokio::spawn(async move {
            log_debug!("responder listening for connections");

            while let Some(port) = listener.accept().await {
                let _connection = responder.serve_port(port);
            }

            log_debug!("connection listener closed");
        })
    }

    /// Serve a single connection until its inbox ends.
    pub fn serve_port(&self, port: Port) -> JoinHandle<()> {
        // ---
        let responder = self.clone();

        tokio::spawn(async move {
            let Port { outbox, mut inbox } = port;
            log_info!("{}: connection accepted", outbox.port_id());

            while let Some(message) = inbox.recv().await {
                let responder = responder.clone();
                let outbox = outbox.clone();

                tokio::spawn(async move {
                    if let Some(reply) = responder.handle_message(message).await {
                        post_reply(&outbox, reply);
                    }
                });
            }

            log_info!("{}: connection closed", outbox.port_id());
        })
    }

    /// Run one call to completion and build its reply.
    ///
    /// Never fails: lookup, codec and procedure errors are all turned into a
    /// failure reply with the call's id.
    pub async fn handle_call(&self, call: CallEnvelope) -> ReplyEnvelope {
        // ---
        let CallEnvelope { id, method, params } = call;

        match self.execute(method, &params.path, params.input).await {
            Ok(data) => ReplyEnvelope::success(id, data),
            Err(err) => {
                log_debug!("call {id} to \"{}\" failed: {err}", params.path);
                ReplyEnvelope::failure(id, err.into_shape(&params.path))
            }
        }
    }

    /// Decode a raw message and run it. Returns `None` only for messages that
    /// carry no usable id, since there is nobody to reply to.
    async fn handle_message(&self, message: Message) -> Option<ReplyEnvelope> {
        // ---
        let id = peek_id(&message);
        let path = message
            .pointer("/params/path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match CallEnvelope::from_message(message) {
            Ok(call) => Some(self.handle_call(call).await),
            Err(err) => match id {
                Some(id) => {
                    log_warn!("call {id} is malformed: {err}");
                    let error = ProcedureError::new(ErrorCode::ParseError, err.to_string());
                    Some(ReplyEnvelope::failure(id, error.into_shape(&path)))
                }
                None => {
                    log_warn!("dropping message without a call id: {err}");
                    None
                }
            },
        }
    }

    async fn execute(&self, kind: CallKind, path: &str, input: Value) -> Result<Value, ProcedureError> {
        // ---
        let procedure = self
            .inner
            .registry
            .resolve(path)
            .ok_or_else(|| ProcedureError::not_found(format!("no {kind} procedure on path \"{path}\"")))?;

        if procedure.kind() != kind {
            return Err(ProcedureError::new(
                ErrorCode::MethodNotSupported,
                format!("\"{path}\" is a {}, not a {kind}", procedure.kind()),
            ));
        }

        let input = self
            .inner
            .codec
            .deserialize(input)
            .map_err(|e| ProcedureError::new(ErrorCode::ParseError, format!("failed to decode input: {e}")))?;

        // Calls execute with an empty context
        let invoked = AssertUnwindSafe(async { procedure.invoke(CallContext::default(), input).await })
            .catch_unwind()
            .await;

        let output = match invoked {
            Ok(result) => result?,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                log_error!("procedure \"{path}\" panicked: {reason}");
                return Err(ProcedureError::internal(format!("procedure panicked: {reason}")));
            }
        };

        self.inner
            .codec
            .serialize(output)
            .map_err(|e| ProcedureError::internal(format!("failed to encode output: {e}")))
    }
}

fn post_reply(outbox: &PortPtr, reply: ReplyEnvelope) {
    // ---
    let id = reply.id;

    if let Err(err) = reply.to_message().and_then(|message| outbox.post(message)) {
        log_error!("{}: failed to post reply for call {id}: {err}", outbox.port_id());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    // ---
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
