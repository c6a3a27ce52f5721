//! Per-channel traffic statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a channel's traffic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Messages accepted by the outbound sink.
    pub messages_sent: u64,

    /// Payload bytes accepted by the outbound sink.
    pub bytes_sent: u64,

    /// DATA messages handed to the reader.
    pub messages_received: u64,

    /// Payload bytes handed to the reader.
    pub bytes_received: u64,

    /// Enqueue attempts rejected because the sink was full.
    pub congestion_rejections: u64,
}

impl ChannelStats {
    /// Returns the share of enqueue attempts rejected for congestion, in percent.
    pub fn congestion_rate(&self) -> f32 {
        let attempts = self.messages_sent + self.congestion_rejections;
        if attempts == 0 {
            0.0
        } else {
            (self.congestion_rejections as f32 / attempts as f32) * 100.0
        }
    }
}

/// Live counters updated from the writer and reader sides concurrently.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    congestion_rejections: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_congestion(&self) {
        self.congestion_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            congestion_rejections: self.congestion_rejections.load(Ordering::Relaxed),
        }
    }
}
