//! imgnow broker library
//!
//! Queue-based messaging used to offload video transcoding. [`MessageBroker`] hides
//! the transport: [`AmqpBroker`] talks to RabbitMQ, [`MemoryBroker`] keeps queues in
//! process for development and tests.
//!
//! Request/reply is layered on plain queues: each [`TranscodeRpcClient`] call declares
//! its own auto-deleting reply queue, named from a fresh request id, and waits on it
//! for the reply carrying that id.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod rpc;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use error::{BrokerError, TranscodeError};
pub use memory::{BrokerStats, MemoryBroker};
pub use protocol::{job_filename, reply_queue_name, TranscodeMessage, JSON_CONTENT_TYPE};
pub use rpc::{TranscodeOutput, TranscodeRpcClient};
pub use traits::{
    Acknowledger, ConsumeOptions, Delivery, DeliveryStream, MessageBroker, OutboundMessage,
    QueueOptions,
};
