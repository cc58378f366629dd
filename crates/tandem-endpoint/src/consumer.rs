//! Sink for outgoing messages

use tandem_core::Message;
use tokio::sync::mpsc;

/// Receives every message the endpoint emits.
///
/// Called concurrently from the routing thread and from pool workers.
pub trait Consumer: Send + Sync {
    fn send(&self, message: Message);
}

impl<F> Consumer for F
where
    F: Fn(Message) + Send + Sync,
{
    fn send(&self, message: Message) {
        self(message)
    }
}

impl Consumer for mpsc::UnboundedSender<Message> {
    fn send(&self, message: Message) {
        if let Err(mpsc::error::SendError(message)) = mpsc::UnboundedSender::send(self, message) {
            tracing::warn!(
                "Dropping outgoing message, consumer closed: {:?}",
                message.id()
            );
        }
    }
}
