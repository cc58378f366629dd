use tandem_core::{Message, RawMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Newline-delimited JSON framing over a Unix socket.
///
/// Each direction is a separate half so reads and writes can live on
/// different tasks.
pub struct Connection {
    reader: MessageReader,
    writer: MessageWriter,
}

impl Connection {
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: MessageReader {
                inner: BufReader::new(read_half),
                line: String::new(),
            },
            writer: MessageWriter {
                inner: BufWriter::new(write_half),
            },
        }
    }

    pub fn into_split(self) -> (MessageReader, MessageWriter) {
        (self.reader, self.writer)
    }

    pub async fn read_message(&mut self) -> Result<RawMessage> {
        self.reader.read_message().await
    }

    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        self.writer.write_message(message).await
    }
}

pub struct MessageReader {
    inner: BufReader<ReadHalf<UnixStream>>,
    line: String,
}

impl MessageReader {
    /// Read the next message, skipping blank lines.
    ///
    /// A line that is not a JSON message object yields `ConnectionError::Json`
    /// and leaves the stream positioned at the following line.
    pub async fn read_message(&mut self) -> Result<RawMessage> {
        loop {
            self.line.clear();
            let bytes_read = self.inner.read_line(&mut self.line).await?;
            if bytes_read == 0 {
                return Err(ConnectionError::Closed);
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            return Ok(serde_json::from_str(line)?);
        }
    }
}

pub struct MessageWriter {
    inner: BufWriter<WriteHalf<UnixStream>>,
}

impl MessageWriter {
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let json = serde_json::to_string(message)?;

        self.inner.write_all(json.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
