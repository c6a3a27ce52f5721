//! Outbound sink abstraction.
//!
//! The outbound sink is the pending-write queue of the physical
//! connection. Every channel on a transport holds a handle to the same
//! sink; exactly one transport loop drains it.
//!
//! # Implementations
//!
//! - `tokio::sync::mpsc::Sender<Message>`: the default bounded sink,
//!   built with [`outbound_sink`] or [`outbound_sink_for`].
//!
//! # Example
//!
//! ```rust,ignore
//! use muxchannel::{outbound_sink, Message, ChannelId, OutboundSink};
//!
//! let (sink, mut transport) = outbound_sink(1);
//! sink.try_enqueue(Message::close(ChannelId::generate()))?;
//! assert!(sink.try_enqueue(Message::close(ChannelId::generate())).is_err());
//!
//! let message = transport.recv().await;
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::ChannelConfig;
use crate::error::{EnqueueError, Result};
use crate::message::Message;

/// Producer handle of the default outbound sink.
pub type OutboundSender = mpsc::Sender<Message>;

/// Consumer end of the default outbound sink, owned by the transport loop.
pub type OutboundReceiver = mpsc::Receiver<Message>;

/// Capability to enqueue messages onto the shared outbound sink.
///
/// Implementations must never wait: a sink at capacity reports
/// [`EnqueueError::Full`] synchronously and keeps its contents untouched.
pub trait OutboundSink: Send + Sync {
    /// Attempts to enqueue a message without waiting.
    fn try_enqueue(&self, message: Message) -> core::result::Result<(), EnqueueError>;
}

impl OutboundSink for mpsc::Sender<Message> {
    fn try_enqueue(&self, message: Message) -> core::result::Result<(), EnqueueError> {
        self.try_send(message).map_err(|e| match e {
            TrySendError::Full(message) => EnqueueError::Full(message),
            TrySendError::Closed(message) => EnqueueError::Closed(message),
        })
    }
}

impl<T: OutboundSink + ?Sized> OutboundSink for Arc<T> {
    fn try_enqueue(&self, message: Message) -> core::result::Result<(), EnqueueError> {
        (**self).try_enqueue(message)
    }
}

/// Creates a bounded outbound sink holding at most `capacity` messages.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn outbound_sink(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity)
}

/// Creates an outbound sink sized by `config.sink_capacity`.
pub fn outbound_sink_for(config: &ChannelConfig) -> Result<(OutboundSender, OutboundReceiver)> {
    config.validate()?;
    Ok(outbound_sink(config.sink_capacity))
}
