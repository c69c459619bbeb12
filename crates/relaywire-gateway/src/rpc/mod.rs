//! RPC dispatch: method registry, input schemas, and the call context.

pub mod dispatcher;
pub mod schema;

pub use dispatcher::{register_result_type, RpcCtx, RpcDispatcher, RpcMethod};
pub use schema::{require_non_empty, InputSchema, Validate};
