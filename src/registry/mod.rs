//! Procedure registry.
//!
//! A registry maps full dotted paths (`"users.byId"`) to typed procedures.
//! Nested routers are expressed by [`RegistryBuilder::merge`], which prefixes
//! every path of the merged builder, so the tree is flattened once at build
//! time and lookup is a single map access.
//!
//! The registry is immutable once built and is shared behind an `Arc` by
//! every connection the responder serves.

mod handler;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use handler::CallContext;
pub(crate) use handler::BoxFuture;
use handler::{Handler, ProcedureFn};

use crate::{CallKind, ProcedureError, Result, RpcError};

/// A registered procedure: its call kind plus the erased handler.
#[derive(Clone)]
pub struct Procedure {
    kind: CallKind,
    handler: Arc<dyn ProcedureFn>,
}

impl Procedure {
    /// Kind this procedure answers to.
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub(crate) fn invoke(&self, ctx: CallContext, input: Value) -> BoxFuture<'static, std::result::Result<Value, ProcedureError>> {
        self.handler.call(ctx, input)
    }
}

/// Read-only map from dotted path to procedure.
pub struct ProcedureRegistry {
    procedures: HashMap<String, Procedure>,
}

impl ProcedureRegistry {
    // ---
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a procedure by its full dotted path.
    pub fn resolve(&self, path: &str) -> Option<&Procedure> {
        self.procedures.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.procedures.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Registered paths in sorted order.
    pub fn paths(&self) -> Vec<&str> {
        // ---
        let mut paths: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

/// Builder for [`ProcedureRegistry`].
///
/// Registration errors (bad paths, duplicates) are collected and reported by
/// [`build`](Self::build), so registrations can be chained.
///
/// # Example
///
/// ```
/// use port_rpc::{CallContext, ProcedureError, ProcedureRegistry};
///
/// let math = ProcedureRegistry::builder()
///     .query("double", |_ctx: CallContext, n: i64| async move { Ok::<_, ProcedureError>(n * 2) });
///
/// let registry = ProcedureRegistry::builder()
///     .merge("math", math)
///     .build()
///     .unwrap();
///
/// assert!(registry.contains("math.double"));
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    // ---
    procedures: HashMap<String, Procedure>,
    errors: Vec<RpcError>,
}

impl RegistryBuilder {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query procedure.
    pub fn query<F, Fut, TReq, TResp>(self, path: &str, handler: F) -> Self
    where
        F: Fn(CallContext, TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, ProcedureError>> + Send + 'static,
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
    {
        self.register(CallKind::Query, path, handler)
    }

    /// Register a mutation procedure.
    pub fn mutation<F, Fut, TReq, TResp>(self, path: &str, handler: F) -> Self
    where
        F: Fn(CallContext, TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, ProcedureError>> + Send + 'static,
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
    {
        self.register(CallKind::Mutation, path, handler)
    }

    /// Nest every procedure of `other` under `prefix`.
    pub fn merge(mut self, prefix: &str, other: RegistryBuilder) -> Self {
        // ---
        self.errors.extend(other.errors);

        if !is_valid_path(prefix) {
            self.errors.push(RpcError::InvalidPath(prefix.to_string()));
            return self;
        }

        for (path, procedure) in other.procedures {
            self.insert(format!("{prefix}.{path}"), procedure);
        }
        self
    }

    /// Finish registration.
    ///
    /// # Errors
    ///
    /// Returns the first registration error:
    /// - `RpcError::InvalidPath` for an empty segment or whitespace in a path
    /// - `RpcError::DuplicateProcedure` if two procedures share a full path
    pub fn build(self) -> Result<ProcedureRegistry> {
        // ---
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        crate::log_debug!("procedure registry built with {} procedures", self.procedures.len());

        Ok(ProcedureRegistry {
            procedures: self.procedures,
        })
    }

    fn register<F, Fut, TReq, TResp>(mut self, kind: CallKind, path: &str, handler: F) -> Self
    where
        F: Fn(CallContext, TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, ProcedureError>> + Send + 'static,
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
    {
        // ---
        if !is_valid_path(path) {
            self.errors.push(RpcError::InvalidPath(path.to_string()));
            return self;
        }

        let procedure = Procedure {
            kind,
            handler: Arc::new(Handler::new(handler)),
        };
        self.insert(path.to_string(), procedure);
        self
    }

    fn insert(&mut self, path: String, procedure: Procedure) {
        // ---
        if self.procedures.contains_key(&path) {
            self.errors.push(RpcError::DuplicateProcedure(path));
            return;
        }
        self.procedures.insert(path, procedure);
    }
}

fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.chars().any(char::is_whitespace))
}
