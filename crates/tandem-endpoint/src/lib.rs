//! Tandem endpoint
//!
//! A bidirectional JSON-RPC 2.0 endpoint: routes incoming messages to
//! registered handlers, runs deferred work on a bounded pool, correlates
//! responses in both directions and implements `$/cancelRequest`.

pub mod consumer;
pub mod dispatcher;
pub mod endpoint;
pub mod ids;
pub mod ipc;
pub mod methods;
pub mod pool;
pub mod table;

pub use consumer::Consumer;
pub use dispatcher::{Dispatcher, Handler, Job, Reply};
pub use endpoint::{Endpoint, EndpointBuilder, EndpointError, PendingRequest};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use ipc::{IpcServer, IpcServerError};
pub use pool::{JobOutcome, TaskHandle, WorkerPool};
pub use table::CorrelationTable;
