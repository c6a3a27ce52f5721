//! Logical channel endpoint.
//!
//! A [`Channel`] is one multiplexed stream. Outbound operations build a
//! [`Message`] and try to enqueue it onto the shared outbound sink
//! without waiting; inbound messages are pushed into the channel's
//! mailbox by the dispatcher and drained with [`Channel::read`].

mod mailbox;

pub use mailbox::Deliverer;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use futures::stream::{self, Stream};
use log::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::{EnqueueError, Error, Result};
use crate::message::{ChannelId, FlowKind, Message};
use crate::sink::{OutboundSender, OutboundSink};
use crate::stats::{ChannelStats, StatsCounters};
use mailbox::Mailbox;

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Created, NEW not yet announced.
    Unopened = 0,

    /// NEW announced, or accepted from the peer.
    Open = 1,

    /// Closed locally or by the peer. Terminal.
    Closed = 2,
}

impl ChannelState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unopened,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Result of [`Channel::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Payload of a DATA message, possibly empty.
    Data(Vec<u8>),

    /// The channel was closed by the peer or the dispatcher went away.
    Closed,
}

impl ReadOutcome {
    /// Returns true for the closed marker.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the payload, or `None` for the closed marker.
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Self::Data(data) => Some(data),
            Self::Closed => None,
        }
    }
}

/// A logical channel multiplexed over a shared transport.
///
/// Every method takes `&self`: wrap the channel in an `Arc` to drive the
/// writer side and the reader side from different tasks.
///
/// # Example
///
/// ```rust,ignore
/// let (sink, transport_rx) = outbound_sink(1024);
/// let (channel, deliverer) = Channel::with_defaults(sink);
///
/// channel.open()?;
/// channel.write(b"ping".to_vec())?;
///
/// while let ReadOutcome::Data(data) = channel.read().await {
///     handle(data);
/// }
/// channel.close()?;
/// ```
pub struct Channel<S = OutboundSender> {
    /// Routing and correlation key.
    id: ChannelId,

    /// Inbound queue fed by the dispatcher.
    mailbox: Mailbox,

    /// Handle to the sink shared by every channel on the transport.
    outbound: S,

    /// Lifecycle state, stored as `ChannelState as u8`.
    state: AtomicU8,

    /// Set once the reader has seen a CLOSE or a dropped deliverer.
    read_closed: AtomicBool,

    config: ChannelConfig,

    stats: StatsCounters,
}

impl<S: OutboundSink> Channel<S> {
    /// Creates a channel with a fresh id.
    ///
    /// Returns the channel and the [`Deliverer`] the dispatcher uses to
    /// feed its mailbox.
    pub fn new(outbound: S, config: &ChannelConfig) -> Result<(Self, Deliverer)> {
        config.validate()?;
        Ok(Self::build(
            ChannelId::generate(),
            outbound,
            config.clone(),
            ChannelState::Unopened,
        ))
    }

    /// Creates a channel with a fresh id and the default configuration.
    pub fn with_defaults(outbound: S) -> (Self, Deliverer) {
        Self::build(
            ChannelId::generate(),
            outbound,
            ChannelConfig::default(),
            ChannelState::Unopened,
        )
    }

    /// Creates the accepting end of a channel the peer announced.
    ///
    /// The dispatcher consumed the peer's NEW message, so the channel
    /// reuses its id and starts out open.
    pub fn accept(id: ChannelId, outbound: S, config: &ChannelConfig) -> Result<(Self, Deliverer)> {
        config.validate()?;
        debug!("Accept channel {}", id);
        Ok(Self::build(id, outbound, config.clone(), ChannelState::Open))
    }

    fn build(
        id: ChannelId,
        outbound: S,
        config: ChannelConfig,
        state: ChannelState,
    ) -> (Self, Deliverer) {
        let (deliverer, mailbox) = mailbox::mailbox(id, config.mailbox_capacity);
        let channel = Self {
            id,
            mailbox,
            outbound,
            state: AtomicU8::new(state as u8),
            read_closed: AtomicBool::new(false),
            config,
            stats: StatsCounters::default(),
        };
        (channel, deliverer)
    }

    /// Returns the channel id. Stable for the channel's lifetime.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true once a local or remote close was observed.
    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }

    /// Announces the channel to the peer by enqueuing a NEW message.
    ///
    /// Fails with [`Error::TransportCongested`] if the outbound sink is
    /// full; the call never waits.
    pub fn open(&self) -> Result<()> {
        self.ensure_writable()?;

        if let Err(e) = self.enqueue(Message::new_channel(self.id)) {
            warn!("Can't initialize new channel {}: {}", self.id, e);
            return Err(e);
        }

        // A concurrent close wins; only UNOPENED moves to OPEN.
        let _ = self.state.compare_exchange(
            ChannelState::Unopened as u8,
            ChannelState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        debug!("New channel {}", self.id);
        Ok(())
    }

    /// Sends a payload to the peer. An empty payload is sent as an empty
    /// DATA frame, distinct from a close.
    pub fn write(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_writable()?;

        if self.state() == ChannelState::Unopened {
            debug!("Write on channel {} before it was opened", self.id);
        }

        let data = data.into();
        let len = data.len();
        if let Err(e) = self.enqueue(Message::data(self.id, data)) {
            warn!("Can't write {} bytes to channel {}: {}", len, self.id, e);
            return Err(e);
        }

        debug!("Write message to channel {} ({} bytes)", self.id, len);
        Ok(())
    }

    /// Announces local termination by enqueuing a CLOSE message.
    ///
    /// Messages already in the mailbox stay readable. Calling `close`
    /// again enqueues another CLOSE; it is never rejected as closed.
    pub fn close(&self) -> Result<()> {
        if let Err(e) = self.enqueue(Message::close(self.id)) {
            warn!("Can't initialize close channel {}: {}", self.id, e);
            return Err(e);
        }

        self.state.store(ChannelState::Closed as u8, Ordering::Release);
        debug!("Close channel {}", self.id);
        Ok(())
    }

    /// Waits for the next inbound message.
    ///
    /// Returns the payload of a DATA message, or [`ReadOutcome::Closed`]
    /// once the peer closed the channel or the dispatcher dropped the
    /// [`Deliverer`]. After the closed marker every further call returns
    /// it again without waiting.
    ///
    /// Cancel safe: dropping the future loses no message.
    pub async fn read(&self) -> ReadOutcome {
        if self.read_closed.load(Ordering::Acquire) {
            return ReadOutcome::Closed;
        }

        loop {
            let Some(message) = self.mailbox.recv().await else {
                debug!("Mailbox of channel {} was released", self.id);
                self.mark_read_closed();
                return ReadOutcome::Closed;
            };

            match message.flow() {
                FlowKind::Data => {
                    let data = message.into_payload().unwrap_or_default();
                    self.stats.record_received(data.len());
                    debug!("Read message from channel {} ({} bytes)", self.id, data.len());
                    return ReadOutcome::Data(data);
                }
                FlowKind::Close => {
                    debug!("Read a close message for channel {}", self.id);
                    self.mark_read_closed();
                    return ReadOutcome::Closed;
                }
                FlowKind::New => {
                    warn!("Ignoring NEW message in mailbox of channel {}", self.id);
                }
            }
        }
    }

    /// Turns the read loop into a stream of payloads that ends at the
    /// closed marker.
    pub fn incoming(&self) -> impl Stream<Item = Vec<u8>> + '_ {
        stream::unfold(self, |channel| async move {
            channel.read().await.into_data().map(|data| (data, channel))
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.strict_lifecycle && self.is_closed() {
            debug!("Rejecting operation on closed channel {}", self.id);
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    fn enqueue(&self, message: Message) -> Result<()> {
        let len = message.payload().map_or(0, <[u8]>::len);
        match self.outbound.try_enqueue(message) {
            Ok(()) => {
                self.stats.record_sent(len);
                Ok(())
            }
            Err(e) => {
                if matches!(e, EnqueueError::Full(_)) {
                    self.stats.record_congestion();
                }
                Err(e.into())
            }
        }
    }

    fn mark_read_closed(&self) {
        self.read_closed.store(true, Ordering::Release);
        self.state.store(ChannelState::Closed as u8, Ordering::Release);
    }
}

impl<S> fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &ChannelState::from_u8(self.state.load(Ordering::Acquire)))
            .field("read_closed", &self.read_closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use crate::sink::{outbound_sink, OutboundReceiver};

    fn drain(rx: &mut OutboundReceiver) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_open_enqueues_new() {
        let (sink, mut rx) = outbound_sink(8);
        let (channel, _deliverer) = Channel::with_defaults(sink);
        assert_eq!(channel.state(), ChannelState::Unopened);

        channel.open().unwrap();

        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(drain(&mut rx), vec![Message::new_channel(channel.id())]);
    }

    #[test]
    fn test_write_order_is_preserved() {
        let (sink, mut rx) = outbound_sink(16);
        let (channel, _deliverer) = Channel::with_defaults(sink);
        let payloads: Vec<Vec<u8>> = (0u8..10).map(|i| vec![i; i as usize]).collect();

        for payload in &payloads {
            channel.write(payload.clone()).unwrap();
        }

        let drained = drain(&mut rx);
        assert_eq!(drained.len(), payloads.len());
        for (message, payload) in drained.iter().zip(&payloads) {
            assert_eq!(message.channel_id(), channel.id());
            assert_eq!(message.flow(), FlowKind::Data);
            assert_eq!(message.payload(), Some(payload.as_slice()));
        }
    }

    #[test]
    fn test_fail_fast_when_sink_full() {
        let (sink, mut rx) = outbound_sink(1);
        let (channel, _deliverer) = Channel::with_defaults(sink);
        let filler = Message::data(ChannelId::generate(), b"filler".to_vec());
        channel.outbound.try_enqueue(filler.clone()).unwrap();

        assert_eq!(channel.open(), Err(Error::TransportCongested));
        assert_eq!(channel.write(b"x".to_vec()), Err(Error::TransportCongested));
        assert_eq!(channel.close(), Err(Error::TransportCongested));

        // Nothing was added and the failed calls left the state alone.
        assert_eq!(drain(&mut rx), vec![filler]);
        assert_eq!(channel.state(), ChannelState::Unopened);
        assert_eq!(channel.stats().congestion_rejections, 3);
        assert_eq!(channel.stats().messages_sent, 0);
    }

    #[test]
    fn test_transport_closed() {
        let (sink, rx) = outbound_sink(4);
        let (channel, _deliverer) = Channel::with_defaults(sink);
        drop(rx);

        assert_eq!(channel.write(b"x".to_vec()), Err(Error::TransportClosed));
        assert_eq!(channel.stats().congestion_rejections, 0);
    }

    #[test]
    fn test_congestion_is_per_call() {
        let (sink, mut rx) = outbound_sink(1);
        let (channel, _deliverer) = Channel::with_defaults(sink);

        channel.write(b"a".to_vec()).unwrap();
        assert_eq!(channel.write(b"b".to_vec()), Err(Error::TransportCongested));

        drain(&mut rx);
        channel.write(b"b".to_vec()).unwrap();
        assert_eq!(rx.try_recv().unwrap().payload(), Some(&b"b"[..]));
    }

    #[tokio::test]
    async fn test_close_keeps_mailbox_readable() {
        let (sink, mut rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let id = channel.id();
        channel.open().unwrap();

        deliverer.deliver(Message::data(id, b"late".to_vec())).await.unwrap();
        channel.close().unwrap();
        channel.close().unwrap();

        assert!(channel.is_closed());
        assert_eq!(channel.read().await, ReadOutcome::Data(b"late".to_vec()));

        let closes = drain(&mut rx).iter().filter(|m| m.is_close()).count();
        assert_eq!(closes, 2);
    }

    #[tokio::test]
    async fn test_read_close_marker_is_idempotent() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let id = channel.id();

        deliverer.deliver(Message::data(id, b"one".to_vec())).await.unwrap();
        deliverer.deliver(Message::close(id)).await.unwrap();

        assert_eq!(channel.read().await, ReadOutcome::Data(b"one".to_vec()));
        assert_eq!(channel.read().await, ReadOutcome::Closed);
        assert_eq!(channel.state(), ChannelState::Closed);

        // Terminal reads never block, even with the deliverer still alive.
        for _ in 0..3 {
            let outcome = timeout(Duration::from_millis(50), channel.read()).await;
            assert_eq!(outcome, Ok(ReadOutcome::Closed));
        }
    }

    #[tokio::test]
    async fn test_empty_payload_is_not_closed() {
        let (sink, mut rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);

        channel.write(Vec::new()).unwrap();
        let message = rx.try_recv().unwrap();
        assert_eq!(message.flow(), FlowKind::Data);
        assert_eq!(message.payload(), Some(&[][..]));

        deliverer.deliver(message).await.unwrap();
        assert_eq!(channel.read().await, ReadOutcome::Data(Vec::new()));
        assert!(!channel.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mailbox_bound_blocks_third_delivery() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let id = channel.id();

        deliverer.deliver(Message::data(id, vec![1])).await.unwrap();
        deliverer.deliver(Message::data(id, vec![2])).await.unwrap();

        let third = timeout(Duration::from_secs(1), deliverer.deliver(Message::data(id, vec![3]))).await;
        assert!(third.is_err(), "third delivery must wait for a read");
        assert!(matches!(
            deliverer.try_deliver(Message::data(id, vec![3])),
            Err(crate::DeliveryError::Full(_))
        ));

        assert_eq!(channel.read().await, ReadOutcome::Data(vec![1]));
        deliverer.deliver(Message::data(id, vec![3])).await.unwrap();
        assert_eq!(channel.read().await, ReadOutcome::Data(vec![2]));
        assert_eq!(channel.read().await, ReadOutcome::Data(vec![3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_read_loses_nothing() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);

        let pending = timeout(Duration::from_secs(5), channel.read()).await;
        assert!(pending.is_err());

        deliverer.deliver(Message::data(channel.id(), b"kept".to_vec())).await.unwrap();
        assert_eq!(channel.read().await, ReadOutcome::Data(b"kept".to_vec()));
    }

    #[tokio::test]
    async fn test_dropped_deliverer_releases_reader() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let channel = Arc::new(channel);

        let reader = tokio::spawn({
            let channel = channel.clone();
            async move { channel.read().await }
        });
        tokio::task::yield_now().await;
        drop(deliverer);

        assert_eq!(reader.await.unwrap(), ReadOutcome::Closed);
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_new_in_mailbox_is_skipped() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let id = channel.id();

        deliverer.deliver(Message::new_channel(id)).await.unwrap();
        deliverer.deliver(Message::data(id, b"after".to_vec())).await.unwrap();

        assert_eq!(channel.read().await, ReadOutcome::Data(b"after".to_vec()));
    }

    // Hardening beyond the unguarded protocol: writes after close fail fast.
    #[tokio::test]
    async fn test_strict_lifecycle_rejects_after_close() {
        let (sink, mut rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        channel.open().unwrap();

        deliverer.deliver(Message::close(channel.id())).await.unwrap();
        assert_eq!(channel.read().await, ReadOutcome::Closed);
        drain(&mut rx);

        assert_eq!(channel.write(b"x".to_vec()), Err(Error::ChannelClosed));
        assert_eq!(channel.open(), Err(Error::ChannelClosed));
        assert!(drain(&mut rx).is_empty());

        // Acknowledging the peer's close is still allowed.
        channel.close().unwrap();
        assert_eq!(drain(&mut rx), vec![Message::close(channel.id())]);
    }

    #[test]
    fn test_lenient_lifecycle_allows_write_after_close() {
        let (sink, mut rx) = outbound_sink(8);
        let config = ChannelConfig::new().with_strict_lifecycle(false);
        let (channel, _deliverer) = Channel::new(sink, &config).unwrap();

        channel.close().unwrap();
        channel.write(b"x".to_vec()).unwrap();

        let flows: Vec<FlowKind> = drain(&mut rx).iter().map(Message::flow).collect();
        assert_eq!(flows, vec![FlowKind::Close, FlowKind::Data]);
    }

    #[test]
    fn test_identity_is_stable_and_unique() {
        let (sink, _rx) = outbound_sink(8);
        let (a, _da) = Channel::with_defaults(sink.clone());
        let (b, db) = Channel::with_defaults(sink.clone());

        let id = a.id();
        a.open().unwrap();
        a.write(b"x".to_vec()).unwrap();
        a.close().unwrap();
        assert_eq!(a.id(), id);
        assert_ne!(a.id(), b.id());
        assert_eq!(db.channel_id(), b.id());
    }

    #[test]
    fn test_accept_starts_open() {
        let (sink, _rx) = outbound_sink(8);
        let id = ChannelId::generate();
        let (channel, deliverer) = Channel::accept(id, sink, &ChannelConfig::default()).unwrap();

        assert_eq!(channel.id(), id);
        assert_eq!(deliverer.channel_id(), id);
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (sink, _rx) = outbound_sink(8);
        let config = ChannelConfig::new().with_mailbox_capacity(0);
        assert!(matches!(Channel::new(sink, &config), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_incoming_stream_ends_at_close() {
        let (sink, _rx) = outbound_sink(8);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let id = channel.id();

        let feeder = tokio::spawn(async move {
            for chunk in [&b"a"[..], b"bc", b""] {
                deliverer.deliver(Message::data(id, chunk.to_vec())).await.unwrap();
            }
            deliverer.deliver(Message::close(id)).await.unwrap();
        });

        let received: Vec<Vec<u8>> = channel.incoming().collect().await;
        feeder.await.unwrap();

        assert_eq!(received, vec![b"a".to_vec(), b"bc".to_vec(), Vec::new()]);
        let stats = channel.stats();
        assert_eq!(stats.messages_received, 3);
        assert_eq!(stats.bytes_received, 3);
    }

    #[tokio::test]
    async fn test_concurrent_writer_and_reader() {
        let (sink, mut rx) = outbound_sink(64);
        let (channel, deliverer) = Channel::with_defaults(sink);
        let channel = Arc::new(channel);
        let id = channel.id();

        let writer = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel.open().unwrap();
                for i in 0u8..20 {
                    channel.write(vec![i]).unwrap();
                }
            }
        });
        let reader = tokio::spawn({
            let channel = channel.clone();
            async move {
                let mut seen = Vec::new();
                while let ReadOutcome::Data(data) = channel.read().await {
                    seen.extend(data);
                }
                seen
            }
        });

        for i in 0u8..5 {
            deliverer.deliver(Message::data(id, vec![i])).await.unwrap();
        }
        deliverer.deliver(Message::close(id)).await.unwrap();

        writer.await.unwrap();
        assert_eq!(reader.await.unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(drain(&mut rx).len(), 21);
    }
}
