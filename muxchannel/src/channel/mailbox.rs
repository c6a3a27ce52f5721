//! Inbound side of a channel.
//!
//! Each channel owns one bounded mailbox. The inbound dispatcher holds
//! the only [`Deliverer`] for it and the channel's reader drains it, so
//! every mailbox has exactly one producer and one consumer.

use tokio::sync::{mpsc, Mutex};

use crate::error::DeliveryError;
use crate::message::{ChannelId, Message};

/// Creates a mailbox for `channel_id` holding at most `capacity` messages.
pub(crate) fn mailbox(channel_id: ChannelId, capacity: usize) -> (Deliverer, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity);
    let deliverer = Deliverer { channel_id, tx };
    let mailbox = Mailbox { rx: Mutex::new(rx) };
    (deliverer, mailbox)
}

/// Delivery handle for one channel's mailbox, held by the inbound dispatcher.
///
/// Not `Clone`: a mailbox has a single producer. Dropping the deliverer
/// tells the reader that no more messages will arrive.
#[derive(Debug)]
pub struct Deliverer {
    channel_id: ChannelId,
    tx: mpsc::Sender<Message>,
}

impl Deliverer {
    /// Returns the id of the channel this deliverer feeds.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Pushes a message into the mailbox, waiting while it is full.
    ///
    /// Waiting here is the dispatcher's "block the read loop" policy.
    pub async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        log::trace!("Deliver {:?} to channel {}", message.flow(), self.channel_id);
        self.tx
            .send(message)
            .await
            .map_err(|e| DeliveryError::Closed(e.0))
    }

    /// Pushes a message into the mailbox, rejecting it if the mailbox is full.
    pub fn try_deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(message) => {
                log::trace!("Mailbox of channel {} is full", self.channel_id);
                DeliveryError::Full(message)
            }
            mpsc::error::TrySendError::Closed(message) => DeliveryError::Closed(message),
        })
    }

    /// Returns true once the channel has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end of a mailbox, owned by the channel.
#[derive(Debug)]
pub(crate) struct Mailbox {
    // Only contended if callers break the single-reader rule.
    rx: Mutex<mpsc::Receiver<Message>>,
}

impl Mailbox {
    /// Waits for the next message. Returns `None` once the deliverer is
    /// gone and the mailbox is drained.
    ///
    /// Cancel safe: dropping the future never loses a message.
    pub(crate) async fn recv(&self) -> Option<Message> {
        self.rx.lock().await.recv().await
    }
}
