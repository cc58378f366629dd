use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::ErrorObject;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Notification method used by either peer to cancel an outstanding request
pub const CANCEL_METHOD: &str = "$/cancelRequest";

/// Request ID (string or number).
///
/// Any JSON number is accepted, including fractions and values past `i64`,
/// and is echoed back exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
}

impl RequestId {
    pub fn number(n: i64) -> Self {
        RequestId::Number(n.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::number(n)
    }
}

impl From<serde_json::Number> for RequestId {
    fn from(n: serde_json::Number) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// Terminal outcome carried by a response: exactly one of `result` or `error`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(ErrorObject),
}

/// A fully-built JSON-RPC message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

/// Payload of a `$/cancelRequest` notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelParams {
    pub id: RequestId,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&ErrorObject> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(error) => Some(error),
        }
    }
}

impl Message {
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(request) => Some(&request.id),
            Message::Notification(_) => None,
            Message::Response(response) => Some(&response.id),
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(response) => Some(response),
            _ => None,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Message::Notification(notification)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

/// Why an incoming message was rejected before routing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("Missing jsonrpc version")]
    MissingVersion,

    #[error("Unsupported jsonrpc version: {0}")]
    UnsupportedVersion(String),

    #[error("Message has neither id nor method")]
    MissingMethod,
}

/// An incoming message as handed over by a transport, before classification.
///
/// Every field is optional; [`RawMessage::classify`] decides which of the
/// three shapes it is. A JSON `null` is treated the same as an absent field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl RawMessage {
    /// Validate the version and decide the message kind: no `id` is a
    /// notification, an `id` without `method` is a response, both is a request.
    ///
    /// A response carrying both `result` and `error` is treated as an error.
    pub fn classify(self) -> Result<Message, MessageError> {
        match self.jsonrpc.as_deref() {
            None => return Err(MessageError::MissingVersion),
            Some(JSONRPC_VERSION) => {}
            Some(other) => return Err(MessageError::UnsupportedVersion(other.to_string())),
        }

        match (self.id, self.method) {
            (None, Some(method)) => Ok(Message::Notification(Notification {
                jsonrpc: JSONRPC_VERSION.to_string(),
                method,
                params: self.params,
            })),
            (None, None) => Err(MessageError::MissingMethod),
            (Some(id), None) => {
                let payload = match self.error {
                    Some(error) => ResponsePayload::Error(error),
                    None => ResponsePayload::Result(self.result.unwrap_or(Value::Null)),
                };
                Ok(Message::Response(Response {
                    jsonrpc: JSONRPC_VERSION.to_string(),
                    id,
                    payload,
                }))
            }
            (Some(id), Some(method)) => Ok(Message::Request(Request {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                method,
                params: self.params,
            })),
        }
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Request(request) => RawMessage {
                jsonrpc: Some(request.jsonrpc),
                id: Some(request.id),
                method: Some(request.method),
                params: request.params,
                ..Default::default()
            },
            Message::Notification(notification) => RawMessage {
                jsonrpc: Some(notification.jsonrpc),
                method: Some(notification.method),
                params: notification.params,
                ..Default::default()
            },
            Message::Response(response) => {
                let (result, error) = match response.payload {
                    ResponsePayload::Result(value) => (Some(value), None),
                    ResponsePayload::Error(error) => (None, Some(error)),
                };
                RawMessage {
                    jsonrpc: Some(response.jsonrpc),
                    id: Some(response.id),
                    result,
                    error,
                    ..Default::default()
                }
            }
        }
    }
}
