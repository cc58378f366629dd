//! Error objects and the error taxonomy carried in error responses

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Standard JSON-RPC 2.0 error codes, plus the cancellation code used by
/// editor protocols.
pub mod error_codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const REQUEST_CANCELLED: i64 = -32800;
}

/// JSON-RPC error object, as it appears under `error` in a response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Everything that can go wrong with a single JSON-RPC call.
///
/// Handlers return this (through `anyhow`) for intentional protocol-level
/// failures; the endpoint produces the remaining variants itself. Any other
/// failure type is wrapped as [`RpcError::InternalError`] by
/// [`RpcError::from_failure`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("Method Not Found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid Params: {message}")]
    InvalidParams { message: String },

    #[error("{message}")]
    InternalError {
        message: String,
        data: Option<Value>,
    },

    #[error("Request Cancelled")]
    RequestCancelled,

    #[error("{0}")]
    Application(ErrorObject),
}

impl RpcError {
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            data: None,
        }
    }

    pub fn application(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Application(ErrorObject {
            code,
            message: message.into(),
            data,
        })
    }

    pub fn code(&self) -> i64 {
        match self {
            RpcError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            RpcError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            RpcError::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            RpcError::InternalError { .. } => error_codes::INTERNAL_ERROR,
            RpcError::RequestCancelled => error_codes::REQUEST_CANCELLED,
            RpcError::Application(obj) => obj.code,
        }
    }

    /// Render the wire error object
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            RpcError::MethodNotFound { method } => ErrorObject::new(self.code(), self.to_string())
                .with_data(json!({ "method": method })),
            RpcError::InvalidRequest { message } | RpcError::InvalidParams { message } => {
                ErrorObject::new(self.code(), message.clone())
            }
            RpcError::InternalError { message, data } => ErrorObject {
                code: self.code(),
                message: message.clone(),
                data: data.clone(),
            },
            RpcError::Application(obj) => obj.clone(),
            _ => ErrorObject::new(self.code(), self.to_string()),
        }
    }

    /// Decode an error object received from the peer.
    ///
    /// Standard codes map back onto their own variants when the variant can
    /// hold what the peer sent: invalid request and invalid params without
    /// `data`, method not found with a `{"method": ...}` payload. Anything
    /// else is kept verbatim as [`RpcError::Application`].
    pub fn from_error_object(obj: ErrorObject) -> Self {
        match (obj.code, &obj.data) {
            (error_codes::REQUEST_CANCELLED, _) => RpcError::RequestCancelled,
            (error_codes::INTERNAL_ERROR, _) => RpcError::InternalError {
                message: obj.message,
                data: obj.data,
            },
            (error_codes::INVALID_REQUEST, None) => RpcError::InvalidRequest {
                message: obj.message,
            },
            (error_codes::INVALID_PARAMS, None) => RpcError::InvalidParams {
                message: obj.message,
            },
            (error_codes::METHOD_NOT_FOUND, Some(data)) => match data["method"].as_str() {
                Some(method) => RpcError::method_not_found(method),
                None => RpcError::Application(obj),
            },
            _ => RpcError::Application(obj),
        }
    }

    /// Classify a handler failure.
    ///
    /// A failure that is an `RpcError` (possibly behind `.context()`) is passed
    /// through unchanged. Anything else becomes an internal error carrying the
    /// cause chain.
    pub fn from_failure(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc_error) => rpc_error,
            Err(err) => {
                let causes: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
                RpcError::InternalError {
                    message: err.to_string(),
                    data: Some(json!({ "causes": causes })),
                }
            }
        }
    }
}

impl From<RpcError> for ErrorObject {
    fn from(error: RpcError) -> Self {
        error.to_error_object()
    }
}
