use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::*;
use muxchannel::retry::{close_with_retry, write_with_retry};
use muxchannel::{
    outbound_sink_for, Channel, ChannelConfig, ChannelId, Deliverer, FlowKind, Message,
    OutboundReceiver, OutboundSender, ReadOutcome, RetryPolicy,
};

/// One side of an in-process transport.
///
/// Owns the outbound sink shared by all of its channels and the routing
/// table the inbound dispatcher uses to find a channel's mailbox.
pub struct Peer {
    name: &'static str,
    config: ChannelConfig,
    sink: OutboundSender,
    routes: Mutex<HashMap<ChannelId, Arc<Deliverer>>>,
    policy: RetryPolicy,
}

impl Peer {
    pub fn new(
        name: &'static str,
        config: &ChannelConfig,
        policy: RetryPolicy,
    ) -> muxchannel::Result<(Arc<Self>, OutboundReceiver)> {
        let (sink, outbound) = outbound_sink_for(config)?;
        let peer = Arc::new(Self {
            name,
            config: config.clone(),
            sink,
            routes: Mutex::new(HashMap::new()),
            policy,
        });
        Ok((peer, outbound))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Creates a local channel and registers its mailbox for routing.
    pub fn open_channel(&self) -> muxchannel::Result<Channel> {
        let (channel, deliverer) = Channel::new(self.sink.clone(), &self.config)?;
        self.add_route(deliverer);
        info!("[{}] Created channel {}", self.name, channel.id());
        Ok(channel)
    }

    /// Number of channels the dispatcher can still route to.
    pub fn route_count(&self) -> usize {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn add_route(&self, deliverer: Deliverer) {
        let id = deliverer.channel_id();
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(deliverer));
    }

    fn route(&self, id: &ChannelId) -> Option<Arc<Deliverer>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).get(id).cloned()
    }

    fn remove_route(&self, id: &ChannelId) {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }

    /// Inbound dispatcher: routes one message arriving from the remote side.
    ///
    /// Waits for mailbox space, which holds back the whole inbound pump.
    async fn dispatch(&self, message: Message) {
        let id = message.channel_id();
        match message.flow() {
            FlowKind::New => match Channel::accept(id, self.sink.clone(), &self.config) {
                Ok((channel, deliverer)) => {
                    self.add_route(deliverer);
                    info!("[{}] Accepted channel {}", self.name, id);
                    tokio::spawn(echo(channel, self.policy));
                }
                Err(e) => error!("[{}] Failed to accept channel {}: {}", self.name, id, e),
            },
            FlowKind::Data => {
                let Some(deliverer) = self.route(&id) else {
                    warn!("[{}] Dropping data for unknown channel {}", self.name, id);
                    return;
                };
                if let Err(e) = deliverer.deliver(message).await {
                    warn!("[{}] Channel {} is gone: {}", self.name, id, e);
                    self.remove_route(&id);
                }
            }
            FlowKind::Close => {
                if let Some(deliverer) = self.route(&id) {
                    // The reader may already be gone; the route goes either way.
                    let _ = deliverer.deliver(message).await;
                    self.remove_route(&id);
                    debug!("[{}] Removed route for channel {}", self.name, id);
                }
            }
        }
    }
}

/// Transport loop: drains one peer's outbound sink into the other peer.
pub async fn pump(mut outbound: OutboundReceiver, remote: Arc<Peer>) {
    while let Some(message) = outbound.recv().await {
        trace!(
            "[{}] <- {:?} on channel {}",
            remote.name,
            message.flow(),
            message.channel_id()
        );
        remote.dispatch(message).await;
    }
    info!("[{}] Outbound sink closed", remote.name);
}

/// Echoes every payload back until the peer closes, then acknowledges the close.
async fn echo(channel: Channel, policy: RetryPolicy) {
    let id = channel.id();
    while let ReadOutcome::Data(data) = channel.read().await {
        if let Err(e) = write_with_retry(&channel, &data, &policy).await {
            error!("Echo on channel {} failed: {}", id, e);
            break;
        }
    }

    if let Err(e) = close_with_retry(&channel, &policy).await {
        error!("Failed to close channel {}: {}", id, e);
    }
    let stats = channel.stats();
    debug!(
        "Echo on channel {} done: {} messages, {} bytes",
        id, stats.messages_received, stats.bytes_received
    );
}
