use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use crate::ProcedureError;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execution context handed to every procedure.
///
/// Calls carry no authentication or per-call state across the channel, so the
/// context is always empty.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct CallContext {}

/// Type-erased async procedure.
///
/// Takes the codec-deserialized input as a JSON value and yields the output
/// as a JSON value, so procedures of different types can share one map.
pub(crate) trait ProcedureFn: Send + Sync {
    fn call(&self, ctx: CallContext, input: Value) -> BoxFuture<'static, Result<Value, ProcedureError>>;
}

/// Adapter from a typed handler closure to [`ProcedureFn`].
pub(crate) struct Handler<F, Fut, TReq, TResp>
where
    F: Fn(CallContext, TReq) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TResp, ProcedureError>> + Send,
    TReq: DeserializeOwned,
    TResp: Serialize,
{
    func: F,
    _phantom: PhantomData<fn(TReq, TResp, Fut)>,
}

impl<F, Fut, TReq, TResp> Handler<F, Fut, TReq, TResp>
where
    F: Fn(CallContext, TReq) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TResp, ProcedureError>> + Send,
    TReq: DeserializeOwned,
    TResp: Serialize,
{
    pub(crate) fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut, TReq, TResp> ProcedureFn for Handler<F, Fut, TReq, TResp>
where
    F: Fn(CallContext, TReq) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TResp, ProcedureError>> + Send + 'static,
    TReq: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
{
    fn call(&self, ctx: CallContext, input: Value) -> BoxFuture<'static, Result<Value, ProcedureError>> {
        // ---
        // Input that does not fit the handler's type is the caller's fault
        let req: TReq = match serde_json::from_value(input) {
            Ok(r) => r,
            Err(e) => {
                return Box::pin(async move { Err(ProcedureError::bad_request(format!("invalid input: {e}"))) })
            }
        };

        let fut = (self.func)(ctx, req);

        Box::pin(async move {
            let resp = fut.await?;
            serde_json::to_value(resp)
                .map_err(|e| ProcedureError::internal(format!("failed to encode output: {e}")))
        })
    }
}
