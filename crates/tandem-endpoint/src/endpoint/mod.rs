//! The JSON-RPC endpoint: routes incoming messages, correlates responses in
//! both directions and shapes everything sent back to the peer.
//!
//! `consume` is expected to be called from one routing context at a time.
//! Deferred handler work and its completion code run on the worker pool, so
//! outgoing messages may reach the consumer from several threads and in any
//! order.

mod incoming;
mod outgoing;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tandem_core::models::EndpointConfig;
use tandem_core::{Message, RawMessage, RequestId, RpcError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::consumer::Consumer;
use crate::dispatcher::Dispatcher;
use crate::ids::{IdGenerator, UuidIdGenerator};
use crate::pool::{TaskHandle, WorkerPool};
use crate::table::CorrelationTable;

pub use outgoing::PendingRequest;

/// Endpoint error
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint has been shut down")]
    Shutdown,

    #[error("Request id {0} is already outstanding")]
    DuplicateRequestId(RequestId),

    #[error("No tokio runtime available for the worker pool")]
    NoRuntime,

    #[error("Invalid endpoint config: {0}")]
    Config(#[from] tandem_core::Error),
}

pub type Result<T> = std::result::Result<T, EndpointError>;

type Settle = oneshot::Sender<std::result::Result<Value, RpcError>>;

/// One side of a bidirectional JSON-RPC session. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    dispatcher: Dispatcher,
    consumer: Box<dyn Consumer>,
    id_generator: Box<dyn IdGenerator>,
    /// Requests received from the peer whose deferred work is in flight
    client_requests: CorrelationTable<TaskHandle>,
    /// Requests sent to the peer awaiting a response
    server_requests: CorrelationTable<Settle>,
    pool: WorkerPool,
    shut_down: AtomicBool,
}

pub struct EndpointBuilder {
    dispatcher: Dispatcher,
    consumer: Box<dyn Consumer>,
    config: EndpointConfig,
    id_generator: Option<Box<dyn IdGenerator>>,
    runtime: Option<Handle>,
}

impl EndpointBuilder {
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    pub fn id_generator<G>(mut self, id_generator: G) -> Self
    where
        G: IdGenerator + 'static,
    {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Run deferred work on this runtime instead of the ambient one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Endpoint> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| EndpointError::NoRuntime)?,
        };

        tracing::debug!(
            "Creating endpoint with {} workers for methods {:?}",
            self.config.max_workers,
            self.dispatcher.methods()
        );

        Ok(Endpoint {
            inner: Arc::new(Inner {
                dispatcher: self.dispatcher,
                consumer: self.consumer,
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::new(UuidIdGenerator)),
                client_requests: CorrelationTable::new(),
                server_requests: CorrelationTable::new(),
                pool: WorkerPool::new(runtime, self.config.max_workers),
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

impl Endpoint {
    pub fn builder<C>(dispatcher: Dispatcher, consumer: C) -> EndpointBuilder
    where
        C: Consumer + 'static,
    {
        EndpointBuilder {
            dispatcher,
            consumer: Box::new(consumer),
            config: EndpointConfig::default(),
            id_generator: None,
            runtime: None,
        }
    }

    /// Route one incoming message.
    ///
    /// Protocol problems never surface here: malformed messages are dropped,
    /// failing requests are answered with an error response and failing
    /// notifications are logged. The only error is calling after shutdown.
    pub fn consume(&self, message: RawMessage) -> Result<()> {
        self.inner.ensure_running()?;

        let message = match message.classify() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping incoming message: {}", e);
                return Ok(());
            }
        };

        match message {
            Message::Notification(notification) => {
                tracing::debug!("Handling notification {}", notification.method);
                self.inner
                    .handle_notification(notification.method, notification.params);
            }
            Message::Response(response) => {
                tracing::debug!("Handling response to {}", response.id);
                self.inner.handle_response(response);
            }
            Message::Request(request) => {
                tracing::debug!("Handling request {} ({})", request.id, request.method);
                Inner::handle_request(&self.inner, request);
            }
        }

        Ok(())
    }

    /// Parse and route a JSON value; anything that is not a message object is
    /// dropped with a warning
    pub fn consume_value(&self, value: Value) -> Result<()> {
        match serde_json::from_value::<RawMessage>(value) {
            Ok(message) => self.consume(message),
            Err(e) => {
                self.inner.ensure_running()?;
                tracing::warn!("Dropping unparsable message: {}", e);
                Ok(())
            }
        }
    }

    /// Wait for all deferred work to finish and answer, then stop.
    ///
    /// Outgoing requests still waiting for the peer resolve with an internal
    /// error. Later calls to `consume`, `notify` and `request` fail with
    /// [`EndpointError::Shutdown`].
    ///
    /// Must not race `consume`, `notify` or `request` on other threads: a
    /// call that passed its running check before the flag was set can still
    /// submit work or register an outgoing request after the drain.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        tracing::info!(
            "Shutting down endpoint, {} deferred tasks in flight",
            self.inner.pool.in_flight()
        );

        self.inner.pool.shutdown().await;

        for (id, settle) in self.inner.server_requests.drain() {
            tracing::debug!("Abandoning outgoing request {}", id);
            let _ = settle.send(Err(RpcError::internal("Endpoint shut down")));
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Peer requests whose deferred work has not settled yet
    pub fn pending_client_requests(&self) -> usize {
        self.inner.client_requests.len()
    }

    /// Outgoing requests still waiting for a response
    pub fn pending_server_requests(&self) -> usize {
        self.inner.server_requests.len()
    }
}

impl Inner {
    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EndpointError::Shutdown);
        }
        Ok(())
    }

    fn send(&self, message: Message) {
        self.consumer.send(message);
    }
}
