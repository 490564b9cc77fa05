use super::MessageQueue;
use crate::Core::key::SegmentId;
use crate::error::Result;
use std::time::Duration;

/// Default segment name when none is configured.
pub const DEFAULT_SEGMENT: &str = "shmq";
/// 1MB default
pub const DEFAULT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_SLOTS: usize = 16;
pub const DEFAULT_MODE: u32 = 0o600;

/// Settings shared by the arena and the channel semaphores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Segment to attach: numeric key or name
    pub segment: SegmentId,
    /// Bytes to reserve when the segment has to be created
    pub size: usize,
    /// Variable slots (one per channel) in a newly created segment
    pub slots: usize,
    /// Permission bits for the segment and semaphores
    pub mode: u32,
    /// Upper bound on waiting for a channel lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            segment: SegmentId::Name(DEFAULT_SEGMENT.to_string()),
            size: DEFAULT_SIZE,
            slots: DEFAULT_SLOTS,
            mode: DEFAULT_MODE,
            lock_timeout: None,
        }
    }
}

impl QueueConfig {
    /// Defaults overridden by `SHMQ_SEGMENT`, `SHMQ_SIZE`, `SHMQ_SLOTS` and
    /// `SHMQ_LOCK_TIMEOUT_MS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut config = Self::default();
        if let Some(segment) = lookup("SHMQ_SEGMENT").filter(|s| !s.trim().is_empty()) {
            config.segment = SegmentId::from(segment);
        }
        if let Some(size) = lookup("SHMQ_SIZE").and_then(|s| s.trim().parse().ok()) {
            config.size = size;
        }
        if let Some(slots) = lookup("SHMQ_SLOTS").and_then(|s| s.trim().parse().ok()) {
            config.slots = slots;
        }
        if let Some(ms) = lookup("SHMQ_LOCK_TIMEOUT_MS").and_then(|s| s.trim().parse::<u64>().ok()) {
            config.lock_timeout = Some(Duration::from_millis(ms));
        }
        config
    }
}

/// Builds an allocated [`MessageQueue`] with its channels registered.
#[derive(Debug, Default)]
pub struct QueueBuilder {
    config: QueueConfig,
    channels: Vec<String>,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the environment instead of the built-in defaults.
    pub fn from_env() -> Self {
        Self {
            config: QueueConfig::from_env(),
            channels: Vec::new(),
        }
    }

    pub fn with_segment(mut self, segment: impl Into<SegmentId>) -> Self {
        self.config.segment = segment.into();
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.config.size = size;
        self
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.config.slots = slots;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = Some(timeout);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Register the channels, then attach the segment.
    pub fn build(self) -> Result<MessageQueue> {
        let segment = self.config.segment.clone();
        let size = self.config.size;
        let mut queue = MessageQueue::with_config(self.config);
        for channel in &self.channels {
            queue.register_channel(channel)?;
        }
        queue.allocate(segment, size)?;
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.segment, SegmentId::Name("shmq".into()));
        assert_eq!(config.size, DEFAULT_SIZE);
        assert_eq!(config.slots, DEFAULT_SLOTS);
        assert_eq!(config.mode, 0o600);
        assert_eq!(config.lock_timeout, None);
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHMQ_SEGMENT", "5150"),
            ("SHMQ_SIZE", "65536"),
            ("SHMQ_SLOTS", "4"),
            ("SHMQ_LOCK_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config = QueueConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.segment, SegmentId::Key(5150));
        assert_eq!(config.size, 65536);
        assert_eq!(config.slots, 4);
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn garbage_in_environment_keeps_defaults() {
        let config = QueueConfig::from_lookup(|k| match k {
            "SHMQ_SIZE" => Some("lots".into()),
            "SHMQ_SEGMENT" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn builder_setters() {
        let builder = QueueBuilder::new()
            .with_segment("jobs-arena")
            .with_size(4096)
            .with_slots(2)
            .with_mode(0o660)
            .with_lock_timeout(Duration::from_secs(1));
        let config = builder.config();
        assert_eq!(config.segment, SegmentId::Name("jobs-arena".into()));
        assert_eq!(config.size, 4096);
        assert_eq!(config.slots, 2);
        assert_eq!(config.mode, 0o660);
        assert_eq!(config.lock_timeout, Some(Duration::from_secs(1)));
    }
}
