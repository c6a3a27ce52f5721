//! Error types for channel operations.

use thiserror::Error;

use crate::message::Message;

/// Errors surfaced by channel operations.
///
/// None of these are fatal: congestion and closure are ordinary outcomes
/// that the caller is expected to handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The shared outbound sink was at capacity when the call was made.
    #[error("Transport congested: outbound sink is full")]
    TransportCongested,

    /// The transport loop that drains the outbound sink has gone away.
    #[error("Transport closed: outbound sink is no longer drained")]
    TransportClosed,

    /// The channel already observed a local or remote close.
    #[error("Channel closed")]
    ChannelClosed,

    /// A message violated the payload-iff-DATA invariant.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure of a non-blocking enqueue onto an outbound sink.
///
/// The rejected message is handed back so nothing is lost.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The sink is at capacity.
    #[error("outbound sink is full")]
    Full(Message),

    /// The sink's consumer has been dropped.
    #[error("outbound sink is closed")]
    Closed(Message),
}

impl EnqueueError {
    /// Returns the message that could not be enqueued.
    pub fn into_message(self) -> Message {
        match self {
            EnqueueError::Full(message) | EnqueueError::Closed(message) => message,
        }
    }
}

impl From<EnqueueError> for Error {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full(_) => Error::TransportCongested,
            EnqueueError::Closed(_) => Error::TransportClosed,
        }
    }
}

/// Failure to push a message into a channel's mailbox.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The mailbox already holds its maximum number of pending messages.
    #[error("mailbox is full")]
    Full(Message),

    /// The owning channel has been dropped.
    #[error("channel is gone")]
    Closed(Message),
}

impl DeliveryError {
    /// Returns the message that could not be delivered.
    pub fn into_message(self) -> Message {
        match self {
            DeliveryError::Full(message) | DeliveryError::Closed(message) => message,
        }
    }
}
