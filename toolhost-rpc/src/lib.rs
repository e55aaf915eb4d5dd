//! JSON-RPC 2.0 envelope handling, method dispatch and the newline-delimited
//! stream transport.

pub mod envelope;
pub mod handler;
pub mod stream;
pub mod truncate;

pub mod prelude {
    pub use crate::envelope::{parse_request, JsonRpcRequest, JsonRpcResponse};
    pub use crate::handler::{
        JsonRpcHandler, NoopControl, ServerControl, ServerIdentity, ShutdownSignal, PROTOCOL_VERSION,
    };
    pub use crate::truncate::{truncate_if_oversized, MAX_RESPONSE_BYTES};
}
