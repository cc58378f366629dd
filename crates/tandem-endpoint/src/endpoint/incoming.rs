use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tandem_core::{
    CancelParams, Request, RequestId, Response, ResponsePayload, RpcError, CANCEL_METHOD,
};

use super::Inner;
use crate::dispatcher::{Handler, Reply};
use crate::pool::{panic_message, JobOutcome, TaskHandle};

/// Call a handler on the current thread, turning a panic into an error
fn invoke(handler: &dyn Handler, params: Option<Value>) -> anyhow::Result<Reply> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.call(params))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "Handler panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

impl Inner {
    pub(super) fn handle_notification(&self, method: String, params: Option<Value>) {
        if method == CANCEL_METHOD {
            self.handle_cancel_notification(params);
            return;
        }

        let Some(handler) = self.dispatcher.get(&method) else {
            tracing::warn!("Ignoring notification for unknown method {}", method);
            return;
        };

        let reply = match invoke(handler.as_ref(), params) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Failed to handle notification {}: {:#}", method, e);
                return;
            }
        };

        match reply {
            Reply::Immediate(_) => {}
            Reply::Deferred(job) => {
                tracing::debug!("Executing async notification handler for {}", method);
                self.pool
                    .submit(TaskHandle::new(), job, move |outcome| match outcome {
                        JobOutcome::Finished(Ok(_)) => {
                            tracing::debug!("Successfully handled async notification {}", method)
                        }
                        JobOutcome::Finished(Err(e)) => {
                            tracing::error!("Failed to handle async notification {}: {:#}", method, e)
                        }
                        JobOutcome::Cancelled => {
                            tracing::debug!("Async notification {} was cancelled", method)
                        }
                    });
            }
        }
    }

    fn handle_cancel_notification(&self, params: Option<Value>) {
        let id = match params.map(serde_json::from_value::<CancelParams>) {
            Some(Ok(params)) => params.id,
            Some(Err(e)) => {
                tracing::warn!("Ignoring malformed cancel notification: {}", e);
                return;
            }
            None => {
                tracing::warn!("Ignoring cancel notification without params");
                return;
            }
        };

        let Some(task) = self.client_requests.remove(&id) else {
            tracing::warn!("Cancel notification for unknown message id {}", id);
            return;
        };

        // Only wins if the job has not started on a worker yet
        if task.cancel() {
            tracing::debug!("Cancelled request with id {}", id);
        } else {
            tracing::debug!("Request {} already running, cancel has no effect", id);
        }
    }

    pub(super) fn handle_request(self: &Arc<Self>, request: Request) {
        let id = request.id.clone();
        if let Err(error) = self.dispatch_request(request) {
            tracing::error!("Failed to handle request {}: {}", id, error);
            self.send(Response::error(id, error.to_error_object()).into());
        }
    }

    fn dispatch_request(self: &Arc<Self>, request: Request) -> Result<(), RpcError> {
        let Request {
            id, method, params, ..
        } = request;

        let handler = self
            .dispatcher
            .get(&method)
            .ok_or_else(|| RpcError::method_not_found(&method))?;

        if self.client_requests.contains(&id) {
            return Err(RpcError::invalid_request(format!(
                "Request id {} is already in flight",
                id
            )));
        }

        match invoke(handler.as_ref(), params).map_err(RpcError::from_failure)? {
            Reply::Immediate(result) => {
                tracing::debug!("Result from synchronous request handler: {}", result);
                self.send(Response::success(id, result).into());
            }
            Reply::Deferred(job) => {
                tracing::debug!("Executing async request handler for {} ({})", method, id);
                let task = TaskHandle::new();
                // Tracked before submission so a fast job cannot settle first
                if !self.client_requests.insert(id.clone(), task.clone()) {
                    return Err(RpcError::invalid_request(format!(
                        "Request id {} is already in flight",
                        id
                    )));
                }

                let inner = Arc::clone(self);
                let settled = task.clone();
                self.pool.submit(task, job, move |outcome| {
                    inner.complete_request(id, &settled, outcome)
                });
            }
        }

        Ok(())
    }

    /// Completion code for a deferred request; runs on the pool
    fn complete_request(&self, id: RequestId, task: &TaskHandle, outcome: JobOutcome) {
        // Already gone if a cancel notification got here first
        self.client_requests
            .remove_if(&id, |tracked| tracked.same_task(task));

        let response = match outcome {
            JobOutcome::Cancelled => {
                tracing::debug!("Request {} was cancelled before it started", id);
                Response::error(id, RpcError::RequestCancelled.to_error_object())
            }
            JobOutcome::Finished(Ok(result)) => Response::success(id, result),
            JobOutcome::Finished(Err(failure)) => {
                tracing::error!("Failed to handle request {}: {:#}", id, failure);
                Response::error(id, RpcError::from_failure(failure).to_error_object())
            }
        };

        self.send(response.into());
    }

    pub(super) fn handle_response(&self, response: Response) {
        let Response { id, payload, .. } = response;

        let Some(settle) = self.server_requests.remove(&id) else {
            tracing::warn!("Received response to unknown message id {}", id);
            return;
        };

        let outcome = match payload {
            ResponsePayload::Error(error) => {
                tracing::debug!("Received error response to message {}: {}", id, error);
                Err(RpcError::from_error_object(error))
            }
            ResponsePayload::Result(result) => {
                tracing::debug!("Received result for message {}: {}", id, result);
                Ok(result)
            }
        };

        if settle.send(outcome).is_err() {
            tracing::debug!("Caller of request {} stopped waiting", id);
        }
    }
}
