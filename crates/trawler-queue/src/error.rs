//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The backend rejected or failed the request.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// The receipt does not name an in-flight delivery. Either it was
    /// already acknowledged or its visibility timeout expired and the
    /// job went back on the queue.
    #[error("unknown receipt: {0}")]
    UnknownReceipt(String),
}
