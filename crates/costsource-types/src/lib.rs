//! Cost source plugin contract.
//!
//! Defines the fixed operation set a cost source plugin exposes, the
//! messages exchanged, the classified status space, and the field
//! predicates used to judge responses.

#![deny(unsafe_code)]

pub mod envelope;
pub mod messages;
pub mod plugin;
pub mod status;
pub mod validate;

pub use envelope::{RpcRequest, RpcResponse};
pub use messages::*;
pub use plugin::{CallContext, CostSourcePlugin, Operation, SERVICE_PATH};
pub use status::{Code, RpcResult, RpcStatus};
