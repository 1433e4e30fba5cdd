use imgnow_core::AppError;
use thiserror::Error;

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Consume failed: {0}")]
    Consume(String),

    #[error("Acknowledgement failed: {0}")]
    Ack(String),
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Channel(err.to_string())
    }
}

/// Errors from one transcode round trip
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("No transcode reply within {seconds}s")]
    Timeout { seconds: u64 },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Failed to encode transcode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Reply queue closed before a matching reply arrived")]
    ReplyQueueClosed,
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Timeout { seconds } => AppError::TranscodeTimeout { seconds },
            other => AppError::TranscodeFailure(other.to_string()),
        }
    }
}
