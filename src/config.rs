//! Agent configuration.
//!
//! Every knob that used to be a process-wide constant lives here and is
//! passed to the worker context and each agent. All fields have defaults,
//! so a partial config file deserializes cleanly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default delivery queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Default size of a single socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 500;

/// Default number of failed attempts between reconnect progress logs.
pub const DEFAULT_RECONNECT_LOG_EVERY: u32 = 100;

/// What the read loop does after losing its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicy {
    /// Report the disconnect, then reconnect from the read loop.
    #[default]
    Auto,
    /// Only report the disconnect; the worker calls `reconnect()`.
    Manual,
}

/// What the read loop does after a `ProtocolCorruption` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptionPolicy {
    /// Report, drop the buffered bytes and keep reading.
    #[default]
    Discard,
    /// Report, retire the socket and run the reconnect path.
    Reconnect,
}

/// Configuration shared by a worker context and its agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Capacity of the bounded delivery queue.
    pub queue_capacity: usize,
    /// Bytes requested per socket read.
    pub read_buffer_size: usize,
    /// Largest payload accepted or sent.
    pub max_payload_size: u32,
    /// Pause between reconnect attempts, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Log reconnect progress every N failed attempts.
    pub reconnect_log_every: u32,
    /// Reaction to a lost socket.
    pub reconnect_policy: ReconnectPolicy,
    /// Reaction to a corrupt byte stream.
    pub corruption_policy: CorruptionPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            reconnect_log_every: DEFAULT_RECONNECT_LOG_EVERY,
            reconnect_policy: ReconnectPolicy::default(),
            corruption_policy: CorruptionPolicy::default(),
        }
    }
}

impl AgentConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delivery queue capacity (minimum 1).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the socket read size (minimum 1).
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the payload size bound.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the pause between reconnect attempts.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set how often reconnect progress is logged (minimum 1).
    pub fn reconnect_log_every(mut self, attempts: u32) -> Self {
        self.reconnect_log_every = attempts.max(1);
        self
    }

    /// Set the reconnect policy.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Set the corruption policy.
    pub fn corruption_policy(mut self, policy: CorruptionPolicy) -> Self {
        self.corruption_policy = policy;
        self
    }

    /// Pause between reconnect attempts.
    #[inline]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}
