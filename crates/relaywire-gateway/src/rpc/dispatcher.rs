use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::any::{AnyEnvelope, PayloadCodec, TypeRegistry};
use relaywire_core::protocol::rpc::{RpcPayload, RpcRequest};

use crate::obs::RelayMetrics;
use crate::rpc::schema::InputSchema;

/// Per-call context passed to handlers.
#[derive(Clone)]
pub struct RpcCtx {
    conn_id: u64,
    request_id: Arc<str>,
}

impl RpcCtx {
    pub fn new(conn_id: u64, request_id: impl Into<Arc<str>>) -> Self {
        Self {
            conn_id,
            request_id: request_id.into(),
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// A named RPC method: input schema, result type, handler.
#[async_trait]
pub trait RpcMethod: Send + Sync + 'static {
    type Input: InputSchema + Send + 'static;
    type Output: PayloadCodec + Sync;

    fn name(&self) -> &'static str;

    /// `Any` identifier the result is packed under.
    fn result_type(&self) -> &'static str;

    async fn call(&self, ctx: RpcCtx, input: Self::Input) -> Result<Self::Output>;
}

#[async_trait]
trait ErasedMethod: Send + Sync {
    async fn invoke(&self, ctx: RpcCtx, input: &Value, types: &TypeRegistry) -> Result<AnyEnvelope>;
}

struct MethodEntry<M>(M);

#[async_trait]
impl<M: RpcMethod> ErasedMethod for MethodEntry<M> {
    async fn invoke(&self, ctx: RpcCtx, input: &Value, types: &TypeRegistry) -> Result<AnyEnvelope> {
        let input = M::Input::parse(input).map_err(RelayError::Validation)?;
        let output = self.0.call(ctx, input).await?;
        types.pack(&output, Some(self.0.result_type()))
    }
}

/// Method registry and dispatcher.
///
/// Every request gets exactly one reply; failures come back as
/// `status: error` payloads rather than propagating to the transport.
pub struct RpcDispatcher {
    methods: DashMap<&'static str, Arc<dyn ErasedMethod>>,
    types: Arc<TypeRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl RpcDispatcher {
    pub fn new(types: Arc<TypeRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            methods: DashMap::new(),
            types,
            metrics,
        }
    }

    /// Result types must also be registered in the `TypeRegistry` for clients
    /// to unpack them; see [`register_result_type`].
    pub fn register<M: RpcMethod>(&self, method: M) {
        self.methods.insert(method.name(), Arc::new(MethodEntry(method)));
    }

    pub fn registered_methods(&self) -> Vec<&'static str> {
        self.methods.iter().map(|e| *e.key()).collect()
    }

    pub async fn dispatch(&self, ctx: RpcCtx, req: RpcRequest) -> RpcPayload {
        let started = Instant::now();
        let handler = self.methods.get(req.method.as_str()).map(|e| Arc::clone(e.value()));

        let Some(handler) = handler else {
            self.metrics
                .rpc_calls
                .inc(&[("method", "unknown"), ("status", "error")]);
            tracing::warn!(method = %req.method, id = %req.id, "rpc method not found");
            return RpcPayload::error(&req.method, &RelayError::MethodNotFound(req.method.clone()));
        };

        let res = handler.invoke(ctx, &req.data, &self.types).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match res {
            Ok(data) => {
                self.metrics
                    .rpc_calls
                    .inc(&[("method", req.method.as_str()), ("status", "ok")]);
                tracing::debug!(method = %req.method, id = %req.id, elapsed_ms, "rpc ok");
                RpcPayload::ok(req.method, Some(data))
            }
            Err(e) => {
                self.metrics
                    .rpc_calls
                    .inc(&[("method", req.method.as_str()), ("status", "error")]);
                match &e {
                    RelayError::Validation(_) | RelayError::Handler { .. } => {
                        tracing::debug!(method = %req.method, id = %req.id, error = %e, "rpc rejected")
                    }
                    _ => tracing::error!(method = %req.method, id = %req.id, error = %e, elapsed_ms, "rpc failed"),
                }
                RpcPayload::error(req.method, &e)
            }
        }
    }
}

/// Register `M`'s output under its result identifier.
pub fn register_result_type<M: RpcMethod>(types: &mut TypeRegistry, method: &M) {
    types.register::<M::Output>(method.result_type());
}
