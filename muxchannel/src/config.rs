use crate::error::{Error, Result};

/// Default number of pending inbound messages per channel mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 2;

/// Default capacity of the shared outbound sink.
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Tunables for channels on one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Pending inbound messages a mailbox holds before delivery waits.
    pub mailbox_capacity: usize,

    /// Capacity of the outbound sink built by [`crate::outbound_sink_for`].
    pub sink_capacity: usize,

    /// Reject `open`/`write` after the channel observed a close.
    pub strict_lifecycle: bool,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            strict_lifecycle: true,
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    pub fn with_strict_lifecycle(mut self, strict: bool) -> Self {
        self.strict_lifecycle = strict;
        self
    }

    /// Checks that every capacity is usable by a bounded queue.
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(Error::InvalidConfig("mailbox capacity must be non-zero"));
        }
        if self.sink_capacity == 0 {
            return Err(Error::InvalidConfig("sink capacity must be non-zero"));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}
