//! JSON-RPC 2.0 wire model

pub mod error;
pub mod message;

pub use error::{error_codes, ErrorObject, RpcError};
pub use message::{
    CancelParams, Message, MessageError, Notification, RawMessage, Request, RequestId, Response,
    ResponsePayload, CANCEL_METHOD, JSONRPC_VERSION,
};
