use std::path::Path;
use std::sync::Arc;

use tandem_core::models::EndpointConfig;
use tandem_core::Message;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use super::connection::{Connection, ConnectionError};
use crate::dispatcher::Dispatcher;
use crate::endpoint::{Endpoint, EndpointError};

#[derive(Debug, thiserror::Error)]
pub enum IpcServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

pub type Result<T> = std::result::Result<T, IpcServerError>;

/// Serves one endpoint per accepted Unix socket connection, all sharing the
/// same dispatcher
pub struct IpcServer {
    socket_path: String,
    dispatcher: Dispatcher,
    config: EndpointConfig,
}

impl IpcServer {
    pub fn new(socket_path: String, dispatcher: Dispatcher, config: EndpointConfig) -> Self {
        Self {
            socket_path,
            dispatcher,
            config,
        }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale socket file
    pub fn bind(&self) -> Result<UnixListener> {
        let path = Path::new(&self.socket_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        tracing::info!("IPC server listening on {}", self.socket_path);
        Ok(listener)
    }

    pub async fn serve(self: Arc<Self>, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        tracing::debug!("New client connected");

        let (mut reader, mut writer) = Connection::new(stream).into_split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        let endpoint = Endpoint::builder(self.dispatcher.clone(), outgoing_tx)
            .config(self.config.clone())
            .build()?;

        // Ends once the endpoint, which owns the sender, is dropped
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                if let Err(e) = writer.write_message(&message).await {
                    tracing::warn!("Failed to write message: {}", e);
                    break;
                }
            }
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Failed to close writer: {}", e);
            }
        });

        loop {
            match reader.read_message().await {
                Ok(message) => {
                    if let Err(e) = endpoint.consume(message) {
                        tracing::warn!("Endpoint refused message: {}", e);
                        break;
                    }
                }
                Err(ConnectionError::Json(e)) => {
                    tracing::warn!("Dropping unparsable line: {}", e);
                }
                Err(ConnectionError::Closed) => {
                    tracing::debug!("Client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read message: {}", e);
                    break;
                }
            }
        }

        endpoint.shutdown().await;
        drop(endpoint);

        if let Err(e) = writer_task.await {
            tracing::error!("Writer task failed: {}", e);
        }

        Ok(())
    }
}
