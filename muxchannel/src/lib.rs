//! # muxchannel - Logical Channels over a Shared Transport
//!
//! `muxchannel` implements the channel endpoint of a stream multiplexer:
//! one physical connection carries many independent, bidirectional logical
//! streams, each identified by a [`ChannelId`].
//!
//! - **Fail-fast outbound backpressure**: `open`, `write` and `close` never
//!   wait on the shared outbound sink; a full sink is reported as
//!   [`Error::TransportCongested`] so one slow peer cannot stall every
//!   other channel on the transport.
//! - **Bounded mailboxes**: every channel owns an inbound queue holding at
//!   most [`DEFAULT_MAILBOX_CAPACITY`] pending messages.
//! - **Explicit close marker**: [`Channel::read`] yields
//!   [`ReadOutcome::Closed`] instead of an error when the peer closes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │        open() / write() / close()        read()          │
//! ├──────────────────────────┬──────────────────────────────┤
//! │         Channel          │           Mailbox            │
//! │   (try_enqueue, no wait) │   (bounded, per channel)     │
//! ├──────────────────────────┼──────────────────────────────┤
//! │   Shared Outbound Sink   │      Inbound Dispatcher      │
//! │   (one per transport)    │   (Deliverer per channel)    │
//! ├──────────────────────────┴──────────────────────────────┤
//! │                 Transport loop (external)                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use muxchannel::{outbound_sink, Channel, Message, ReadOutcome};
//!
//! let (sink, mut transport) = outbound_sink(1024);
//! let (channel, deliverer) = Channel::with_defaults(sink);
//!
//! channel.open()?;
//! channel.write(b"Hello, World!".to_vec())?;
//!
//! // The dispatcher routes inbound traffic into the mailbox.
//! deliverer.deliver(Message::close(channel.id())).await?;
//! assert_eq!(channel.read().await, ReadOutcome::Closed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod retry;
pub mod sink;
pub mod stats;

// Re-export commonly used types
pub use channel::{Channel, ChannelState, Deliverer, ReadOutcome};
pub use config::{ChannelConfig, DEFAULT_MAILBOX_CAPACITY, DEFAULT_SINK_CAPACITY};
pub use error::{DeliveryError, EnqueueError, Error, Result};
pub use message::{ChannelId, FlowKind, Message};
pub use retry::RetryPolicy;
pub use sink::{outbound_sink, outbound_sink_for, OutboundReceiver, OutboundSender, OutboundSink};
pub use stats::ChannelStats;
