mod peer;

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use log::*;
use muxchannel::retry::{close_with_retry, open_with_retry, write_with_retry};
use muxchannel::{ChannelConfig, RetryPolicy};

use crate::peer::{pump, Peer};

const CHANNEL_COUNT: usize = 4;
const MESSAGES_PER_CHANNEL: usize = 16;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ChannelConfig::default().with_sink_capacity(64);
    let policy = RetryPolicy::default();

    let (client, client_outbound) = Peer::new("client", &config, policy).expect("Failed to create client peer");
    let (server, server_outbound) = Peer::new("server", &config, policy).expect("Failed to create server peer");

    tokio::spawn(pump(client_outbound, server.clone()));
    tokio::spawn(pump(server_outbound, client.clone()));

    info!("Running {} channels x {} messages...", CHANNEL_COUNT, MESSAGES_PER_CHANNEL);
    let start = Instant::now();
    let sessions = (0..CHANNEL_COUNT).map(|index| run_session(client.clone(), index));
    let results = futures::future::join_all(sessions).await;
    let elapsed = start.elapsed();

    let mut echoed_bytes = 0;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(bytes) => echoed_bytes += bytes,
            Err(e) => error!("Session {} failed: {}", index, e),
        }
    }

    info!("=== Loopback Complete ===");
    info!("Echoed: {} bytes", echoed_bytes);
    info!("Time: {:.3} seconds", elapsed.as_secs_f64());
    info!("Open routes: client={}, server={}", client.route_count(), server.route_count());
}

/// Opens one channel, writes a batch of messages, collects the echoes and
/// closes. Returns the number of bytes echoed back.
async fn run_session(client: Arc<Peer>, index: usize) -> muxchannel::Result<usize> {
    let policy = *client.policy();
    let channel = Arc::new(client.open_channel()?);
    open_with_retry(&channel, &policy).await?;

    let reader = tokio::spawn({
        let channel = channel.clone();
        async move {
            channel
                .incoming()
                .fold(0, |total, data| async move { total + data.len() })
                .await
        }
    });

    let mut sent = 0;
    for i in 0..MESSAGES_PER_CHANNEL {
        let payload = format!("channel {} message {}", index, i);
        write_with_retry(&channel, payload.as_bytes(), &policy).await?;
        sent += payload.len();
    }
    close_with_retry(&channel, &policy).await?;

    let echoed = reader.await.expect("Reader task panicked");
    let stats = channel.stats();
    info!(
        "Channel {} done: sent {} bytes, echoed {} bytes, {} congestion retries",
        channel.id(),
        sent,
        echoed,
        stats.congestion_rejections
    );
    if echoed != sent {
        warn!("Channel {} lost {} bytes", channel.id(), sent.abs_diff(echoed));
    }
    Ok(echoed)
}
