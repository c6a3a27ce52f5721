//! Message definition for the channel layer.
//!
//! A message is one flow-control event on one channel. Messages are
//! immutable once built and are moved, never shared, between the
//! outbound sink and the mailboxes.

use core::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier of a logical channel.
///
/// A random 128-bit (UUID v4) value generated once per channel. No
/// central allocator is needed; the chance of two live channels on one
/// transport colliding stays below 10^-18 even at a billion ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Generates a fresh random channel id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, e.g. one decoded from the wire.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the 16 raw bytes of the id.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl From<Uuid> for ChannelId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Flow kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlowKind {
    /// Channel-open announcement.
    New = 0x01,

    /// Payload frame.
    Data = 0x02,

    /// Termination announcement.
    Close = 0x04,
}

impl FlowKind {
    /// Converts a flow tag to a FlowKind.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::New),
            0x02 => Some(Self::Data),
            0x04 => Some(Self::Close),
            _ => None,
        }
    }

    /// Returns the flow tag.
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Returns true if messages of this kind carry a payload.
    pub const fn has_payload(&self) -> bool {
        matches!(self, Self::Data)
    }
}

/// A single flow event on a channel.
///
/// The payload is present if and only if the flow kind is
/// [`FlowKind::Data`]; every constructor upholds this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    channel_id: ChannelId,
    flow: FlowKind,
    payload: Option<Vec<u8>>,
}

impl Message {
    /// Creates a NEW message announcing the channel to the peer.
    pub fn new_channel(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            flow: FlowKind::New,
            payload: None,
        }
    }

    /// Creates a DATA message. An empty payload is still a DATA frame.
    pub fn data(channel_id: ChannelId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel_id,
            flow: FlowKind::Data,
            payload: Some(payload.into()),
        }
    }

    /// Creates a CLOSE message.
    pub fn close(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            flow: FlowKind::Close,
            payload: None,
        }
    }

    /// Builds a message from decoded parts, checking the payload invariant.
    pub fn from_parts(
        channel_id: ChannelId,
        flow: FlowKind,
        payload: Option<Vec<u8>>,
    ) -> Result<Self> {
        match (flow.has_payload(), payload.is_some()) {
            (true, false) => Err(Error::InvalidMessage("DATA message without payload")),
            (false, true) => Err(Error::InvalidMessage("payload on non-DATA message")),
            _ => Ok(Self {
                channel_id,
                flow,
                payload,
            }),
        }
    }

    /// Returns the id of the channel this message belongs to.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Returns the flow kind.
    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    /// Returns the payload of a DATA message.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Consumes the message, returning the payload of a DATA message.
    pub fn into_payload(self) -> Option<Vec<u8>> {
        self.payload
    }

    /// Returns true for CLOSE messages.
    pub fn is_close(&self) -> bool {
        self.flow == FlowKind::Close
    }
}
