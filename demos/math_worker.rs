//! Runs a worker-side responder and a caller-side correlator in one process,
//! connected through the in-memory worker channel.
//!
//! ```text
//! RUST_LOG=debug cargo run --example math_worker
//! ```

use std::sync::Arc;
use std::time::Duration;

use port_rpc::{
    // ---
    memory_worker,
    CallContext,
    CorrelatorBuilder,
    ErrorCode,
    ProcedureError,
    ProcedureRegistry,
    ResponderBuilder,
    RpcError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct DivRequest {
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DivResponse {
    quotient: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let math = ProcedureRegistry::builder().query("div", |_ctx: CallContext, req: DivRequest| async move {
        if req.denominator == 0.0 {
            return Err(ProcedureError::bad_request("division by zero").with_data("numerator", req.numerator));
        }
        Ok(DivResponse {
            quotient: req.numerator / req.denominator,
        })
    });

    let registry = ProcedureRegistry::builder().merge("math", math).build()?;
    println!("worker serves: {:?}", registry.paths());

    // --- worker context
    let (worker, listener) = memory_worker("math-worker");
    let _server = ResponderBuilder::new(Arc::new(registry)).build().listen(listener);

    // --- caller context
    let client = CorrelatorBuilder::new(worker.connect()?)
        .call_timeout(Duration::from_secs(5))
        .build();

    let resp: DivResponse = client
        .query("math.div", DivRequest { numerator: 22.0, denominator: 7.0 })
        .await?;
    println!("22 / 7 = {:.4}", resp.quotient);

    let refused = client
        .query::<_, DivResponse>("math.div", DivRequest { numerator: 1.0, denominator: 0.0 })
        .await;

    match refused {
        Err(RpcError::Remote(remote)) if remote.code() == ErrorCode::BadRequest => {
            println!("rejected: {} (data: {:?})", remote.message(), remote.data());
        }
        Ok(resp) => println!("unexpected quotient {}", resp.quotient),
        Err(other) => return Err(other.into()),
    }

    client.close().await?;
    Ok(())
}
