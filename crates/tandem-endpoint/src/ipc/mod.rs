//! Unix socket transport for the daemon

pub mod connection;
pub mod server;

pub use connection::{Connection, ConnectionError, MessageReader, MessageWriter};
pub use server::{IpcServer, IpcServerError};
