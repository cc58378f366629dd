use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use serde_json::{json, Value};
use tandem_core::{Notification, Request, RequestId, RpcError, CANCEL_METHOD};
use tokio::sync::oneshot;

use super::{Endpoint, EndpointError, Inner, Result};

impl Endpoint {
    /// Send a notification to the peer. Fire-and-forget.
    pub fn notify(&self, method: impl Into<String>, params: Option<Value>) -> Result<()> {
        self.inner.ensure_running()?;

        let method = method.into();
        tracing::debug!("Sending notification: {} {:?}", method, params);
        self.inner.send(Notification::new(method, params).into());
        Ok(())
    }

    /// Send a request to the peer and return a handle to its eventual result.
    ///
    /// No timeout applies: the handle stays pending until the peer answers,
    /// the caller cancels it or the endpoint shuts down.
    pub fn request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<PendingRequest> {
        self.inner.ensure_running()?;

        let method = method.into();
        let id = self.inner.id_generator.next_id();
        tracing::debug!("Sending request with id {}: {} {:?}", id, method, params);

        let (settle, receiver) = oneshot::channel();
        if !self.inner.server_requests.insert(id.clone(), settle) {
            return Err(EndpointError::DuplicateRequestId(id));
        }

        self.inner
            .send(Request::new(id.clone(), method, params).into());

        Ok(PendingRequest {
            id,
            receiver,
            endpoint: Arc::downgrade(&self.inner),
        })
    }
}

impl Inner {
    /// Abandon an outgoing request: tell the peer and settle the caller's
    /// handle. Returns false if the request was already settled.
    fn cancel_server_request(&self, id: &RequestId) -> bool {
        let Some(settle) = self.server_requests.remove(id) else {
            return false;
        };

        tracing::debug!("Cancelling outgoing request {}", id);
        self.send(Notification::new(CANCEL_METHOD, Some(json!({ "id": id }))).into());
        let _ = settle.send(Err(RpcError::RequestCancelled));
        true
    }
}

/// Handle to the result of an outgoing request.
///
/// Await it from async code, or call [`PendingRequest::wait`] from a thread
/// that is not driving a tokio runtime.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    receiver: oneshot::Receiver<std::result::Result<Value, RpcError>>,
    endpoint: Weak<Inner>,
}

fn abandoned() -> RpcError {
    RpcError::internal("Endpoint dropped the pending request")
}

impl PendingRequest {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Cancel the request if no response has arrived yet.
    ///
    /// Sends `$/cancelRequest` to the peer and settles this handle with
    /// [`RpcError::RequestCancelled`]. Returns false if it was already settled.
    pub fn cancel(&self) -> bool {
        match self.endpoint.upgrade() {
            Some(endpoint) => endpoint.cancel_server_request(&self.id),
            None => false,
        }
    }

    /// Block the current thread until the request settles
    pub fn wait(self) -> std::result::Result<Value, RpcError> {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// The outcome if the request already settled
    pub fn try_result(&mut self) -> Option<std::result::Result<Value, RpcError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

impl Future for PendingRequest {
    type Output = std::result::Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(abandoned())))
    }
}
