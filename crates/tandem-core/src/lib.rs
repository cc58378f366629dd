pub mod error;
pub mod models;
pub mod protocol;
pub mod storage;

pub use error::{Error, Result};
pub use protocol::{
    CancelParams, ErrorObject, Message, MessageError, Notification, RawMessage, Request,
    RequestId, Response, ResponsePayload, RpcError, CANCEL_METHOD, JSONRPC_VERSION,
};
